//! Object metadata index: image records keyed by id, listed newest first.

use async_trait::async_trait;

use crate::{BlobResult, ImageId, ImageRecord, NewImageRecord};

mod fs;
mod memory;

pub use fs::FsImageIndex;
pub use memory::MemoryImageIndex;

/// Storage for image records
#[async_trait]
pub trait ImageIndex: Send + Sync {
    /// Store a record under a freshly assigned id
    async fn insert(&self, record: NewImageRecord) -> BlobResult<ImageId>;

    /// Fails with `NotFound` for unknown ids
    async fn find_by_id(&self, id: &ImageId) -> BlobResult<ImageRecord>;

    /// All records, newest upload first
    async fn list_all(&self) -> BlobResult<Vec<ImageRecord>>;

    /// Fails with `NotFound` for unknown ids
    async fn delete_by_id(&self, id: &ImageId) -> BlobResult<()>;
}

/// Order `(insertion sequence, record)` pairs by upload date descending,
/// later insertions first on ties.
pub(crate) fn newest_first(mut entries: Vec<(u64, ImageRecord)>) -> Vec<ImageRecord> {
    entries.sort_by(|(seq_a, a), (seq_b, b)| {
        b.upload_date
            .cmp(&a.upload_date)
            .then_with(|| seq_b.cmp(seq_a))
    });
    entries.into_iter().map(|(_, record)| record).collect()
}
