use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::{ChunkStore, ObjectInfo, WriteHandle};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::{BlobError, BlobResult, ByteStream, ObjectId};

enum Slot {
    /// Reserved by `begin_write`, invisible to readers
    Writing { chunks: Vec<Bytes> },
    Committed {
        chunks: Arc<Vec<Bytes>>,
        size_bytes: u64,
        committed_at: DateTime<Utc>,
    },
}

/// In-memory chunk store for tests and development
#[derive(Clone)]
pub struct MemoryChunkStore {
    objects: Arc<RwLock<HashMap<ObjectId, Slot>>>,
    chunk_size: usize,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Number of reserved-but-uncommitted writes
    pub fn pending_writes(&self) -> usize {
        self.objects
            .read()
            .values()
            .filter(|slot| matches!(slot, Slot::Writing { .. }))
            .count()
    }
}

impl Default for MemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn begin_write(&self) -> BlobResult<WriteHandle> {
        let mut objects = self.objects.write();
        let mut id = ObjectId::new();
        while objects.contains_key(&id) {
            id = ObjectId::new();
        }
        objects.insert(id.clone(), Slot::Writing { chunks: Vec::new() });
        debug!(object_id = %id, "reserved object");
        Ok(WriteHandle::new(id, self.chunk_size))
    }

    async fn write_chunk(&self, handle: &mut WriteHandle, bytes: Bytes) -> BlobResult<()> {
        let ready = handle.segment(bytes);
        if ready.is_empty() {
            return Ok(());
        }

        let mut objects = self.objects.write();
        match objects.get_mut(handle.object_id()) {
            Some(Slot::Writing { chunks }) => {
                chunks.extend(ready.into_iter().map(|(_, chunk)| chunk));
                Ok(())
            }
            _ => Err(BlobError::object_not_found(handle.object_id().as_str())),
        }
    }

    async fn commit_write(&self, mut handle: WriteHandle) -> BlobResult<ObjectId> {
        let tail = handle.finish();
        let id = handle.object_id().clone();

        let mut objects = self.objects.write();
        let mut chunks = match objects.remove(&id) {
            Some(Slot::Writing { chunks }) => chunks,
            Some(committed) => {
                objects.insert(id.clone(), committed);
                return Err(BlobError::validation(format!("object {} is already committed", id)));
            }
            None => return Err(BlobError::object_not_found(id.as_str())),
        };
        if let Some((_, chunk)) = tail {
            chunks.push(chunk);
        }
        if chunks.is_empty() {
            return Err(BlobError::write_incomplete(id.as_str()));
        }

        debug!(object_id = %id, chunks = chunks.len(), size = handle.bytes_written(), "committed object");
        objects.insert(
            id.clone(),
            Slot::Committed {
                chunks: Arc::new(chunks),
                size_bytes: handle.bytes_written(),
                committed_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn abort_write(&self, handle: WriteHandle) -> BlobResult<()> {
        let mut objects = self.objects.write();
        if matches!(objects.get(handle.object_id()), Some(Slot::Writing { .. })) {
            objects.remove(handle.object_id());
            debug!(object_id = %handle.object_id(), "aborted write");
        }
        Ok(())
    }

    async fn open_read(&self, id: &ObjectId) -> BlobResult<ByteStream> {
        let chunks = match self.objects.read().get(id) {
            Some(Slot::Committed { chunks, .. }) => Arc::clone(chunks),
            _ => return Err(BlobError::object_not_found(id.as_str())),
        };

        let stream = async_stream::stream! {
            for chunk in chunks.iter() {
                yield Ok(chunk.clone());
            }
        };
        Ok(Box::pin(stream))
    }

    async fn delete(&self, id: &ObjectId) -> BlobResult<()> {
        let mut objects = self.objects.write();
        if matches!(objects.get(id), Some(Slot::Committed { .. })) {
            objects.remove(id);
            debug!(object_id = %id, "deleted object");
        }
        Ok(())
    }

    async fn list_objects(&self) -> BlobResult<Vec<ObjectInfo>> {
        let objects = self.objects.read();
        let mut infos: Vec<ObjectInfo> = objects
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Committed {
                    chunks,
                    size_bytes,
                    committed_at,
                } => Some(ObjectInfo {
                    id: id.clone(),
                    size_bytes: *size_bytes,
                    chunk_count: chunks.len() as u32,
                    committed_at: *committed_at,
                }),
                Slot::Writing { .. } => None,
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
