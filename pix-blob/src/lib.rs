//! # pix-blob: chunked image storage
//!
//! `pix-blob` is the storage core of the pixshelf image host. It accepts
//! byte streams of any length, stores them as ordered fixed-size chunks under
//! a generated object id, and keeps a metadata record for every image that
//! points at its object.
//!
//! ## Key Features
//!
//! - **Streaming-first**: uploads and downloads never hold a whole image in memory
//! - **Chunk re-segmentation**: callers write payloads of any size, the store persists fixed-size chunks
//! - **Pluggable backends**: filesystem and in-memory implementations of both stores
//! - **Reconciliation**: a sweep that removes orphaned objects and reports dangling records
//!
//! ## Quick Start
//!
//! ```rust
//! use pix_blob::prelude::*;
//! use bytes::Bytes;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let images = ImageCoordinator::new(
//!     MemoryChunkStore::with_chunk_size(4),
//!     MemoryImageIndex::new(),
//!     CoordinatorConfig::default(),
//! );
//!
//! let body = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(b"not really a png"))]);
//! let record = images
//!     .upload(ImageUpload::new("cat.png", "image/png"), Box::pin(body))
//!     .await?;
//!
//! let opened = images.download(&record.id).await?;
//! assert_eq!(opened.content_type(), "image/png");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │    ImageCoordinator     │  ← upload / download / delete / list / sweep
//! ├────────────┬────────────┤
//! │ ChunkStore │ ImageIndex │  ← object bytes / image records
//! └────────────┴────────────┘
//! ```
//!
//! The only link between the two stores is `ImageRecord::storage_ref`.

mod config;
mod coordinator;
mod error;
pub mod index;
mod receipt;
pub mod store;
mod types;

pub use config::{CoordinatorConfig, DEFAULT_CHUNK_SIZE};
pub use coordinator::ImageCoordinator;
pub use error::{BlobError, BlobResult};
pub use index::{FsImageIndex, ImageIndex, MemoryImageIndex};
pub use receipt::{OpenedImage, SweepReport};
pub use store::{ChunkStore, FsChunkStore, MemoryChunkStore, ObjectInfo, WriteHandle};
pub use types::{ByteStream, ImageId, ImageRecord, ImageUpload, NewImageRecord, ObjectId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobError, BlobResult, ByteStream, ChunkStore, CoordinatorConfig, ImageCoordinator,
        ImageId, ImageIndex, ImageRecord, ImageUpload, MemoryChunkStore, MemoryImageIndex,
    };
}
