use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{newest_first, ImageIndex};
use crate::{BlobError, BlobResult, ImageId, ImageRecord, NewImageRecord};

#[derive(Default)]
struct Records {
    by_id: HashMap<ImageId, (u64, ImageRecord)>,
    next_seq: u64,
}

/// In-memory image index for tests and development
#[derive(Clone, Default)]
pub struct MemoryImageIndex {
    records: Arc<RwLock<Records>>,
}

impl MemoryImageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ImageIndex for MemoryImageIndex {
    async fn insert(&self, record: NewImageRecord) -> BlobResult<ImageId> {
        let mut records = self.records.write();
        let mut id = ImageId::new();
        while records.by_id.contains_key(&id) {
            id = ImageId::new();
        }

        let seq = records.next_seq;
        records.next_seq += 1;
        records
            .by_id
            .insert(id.clone(), (seq, record.into_record(id.clone())));
        Ok(id)
    }

    async fn find_by_id(&self, id: &ImageId) -> BlobResult<ImageRecord> {
        self.records
            .read()
            .by_id
            .get(id)
            .map(|(_, record)| record.clone())
            .ok_or_else(|| BlobError::not_found(id.as_str()))
    }

    async fn list_all(&self) -> BlobResult<Vec<ImageRecord>> {
        let entries = self.records.read().by_id.values().cloned().collect();
        Ok(newest_first(entries))
    }

    async fn delete_by_id(&self, id: &ImageId) -> BlobResult<()> {
        self.records
            .write()
            .by_id
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| BlobError::not_found(id.as_str()))
    }
}
