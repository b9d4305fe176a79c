//! Chunk store: durable, chunked storage of arbitrary-length byte streams.
//!
//! A write goes through a [`WriteHandle`]: `begin_write` reserves an
//! [`ObjectId`], every `write_chunk` call feeds bytes of any size, and the
//! handle re-segments them into fixed `chunk_size` chunks before they reach
//! the backend. Only the final chunk of an object may be shorter.
//! Readers never see chunk boundaries as a contract, only the byte sequence.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BlobResult, ByteStream, ObjectId};

pub mod format;
mod fs;
mod memory;

pub use fs::FsChunkStore;
pub(crate) use fs::write_synced;
pub use memory::MemoryChunkStore;

/// Chunked object storage - must be implemented by all storage backends
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Reserve a fresh object id and open a write for it
    async fn begin_write(&self) -> BlobResult<WriteHandle>;

    /// Append bytes to the object; call order is storage order
    async fn write_chunk(&self, handle: &mut WriteHandle, bytes: Bytes) -> BlobResult<()>;

    /// Finalize the object. Fails with `WriteIncomplete` if nothing was written.
    async fn commit_write(&self, handle: WriteHandle) -> BlobResult<ObjectId>;

    /// Discard everything written through this handle
    async fn abort_write(&self, handle: WriteHandle) -> BlobResult<()>;

    /// Stream the object's bytes in write order
    async fn open_read(&self, id: &ObjectId) -> BlobResult<ByteStream>;

    /// Remove all chunks of the object. Unknown ids are not an error.
    async fn delete(&self, id: &ObjectId) -> BlobResult<()>;

    /// Every committed object
    async fn list_objects(&self) -> BlobResult<Vec<ObjectInfo>>;

    /// Fixed on-disk chunk size in bytes
    fn chunk_size(&self) -> usize;
}

/// Summary of a committed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub size_bytes: u64,
    pub chunk_count: u32,
    pub committed_at: DateTime<Utc>,
}

/// An in-progress write for one reserved object id
#[derive(Debug)]
pub struct WriteHandle {
    id: ObjectId,
    chunk_size: usize,
    pending: BytesMut,
    next_index: u32,
    bytes_written: u64,
}

impl WriteHandle {
    pub(crate) fn new(id: ObjectId, chunk_size: usize) -> Self {
        Self {
            id,
            chunk_size: chunk_size.max(1),
            pending: BytesMut::new(),
            next_index: 0,
            bytes_written: 0,
        }
    }

    /// The reserved object id
    pub fn object_id(&self) -> &ObjectId {
        &self.id
    }

    /// Total bytes accepted so far, including the buffered tail
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of full chunks handed to the backend so far
    pub fn chunks_emitted(&self) -> u32 {
        self.next_index
    }

    /// Buffer `bytes` and return the chunks that are now complete, with their indices.
    pub(crate) fn segment(&mut self, mut bytes: Bytes) -> Vec<(u32, Bytes)> {
        self.bytes_written += bytes.len() as u64;
        let mut ready = Vec::new();

        if !self.pending.is_empty() {
            let take = (self.chunk_size - self.pending.len()).min(bytes.len());
            self.pending.extend_from_slice(&bytes.split_to(take));
            if self.pending.len() == self.chunk_size {
                let chunk = self.pending.split().freeze();
                ready.push(self.emit(chunk));
            }
        }

        // Whole chunks straight from the input, no copy
        while bytes.len() >= self.chunk_size {
            let chunk = bytes.split_to(self.chunk_size);
            ready.push(self.emit(chunk));
        }

        if !bytes.is_empty() {
            self.pending.extend_from_slice(&bytes);
        }
        ready
    }

    /// Flush the short tail chunk, if any
    pub(crate) fn finish(&mut self) -> Option<(u32, Bytes)> {
        if self.pending.is_empty() {
            return None;
        }
        let chunk = self.pending.split().freeze();
        Some(self.emit(chunk))
    }

    fn emit(&mut self, chunk: Bytes) -> (u32, Bytes) {
        let index = self.next_index;
        self.next_index += 1;
        (index, chunk)
    }
}
