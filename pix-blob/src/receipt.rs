use serde::{Deserialize, Serialize};

use crate::{ByteStream, ImageId, ImageRecord, ObjectId};

/// Result of opening an image for reading
pub struct OpenedImage {
    pub record: ImageRecord,
    pub stream: ByteStream,
}

impl OpenedImage {
    pub fn content_type(&self) -> &str {
        &self.record.content_type
    }

    pub fn content_length(&self) -> u64 {
        self.record.size
    }

    /// Split into the record and the byte stream
    pub fn into_parts(self) -> (ImageRecord, ByteStream) {
        (self.record, self.stream)
    }
}

impl std::fmt::Debug for OpenedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedImage")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Outcome of a consistency sweep between the chunk store and the index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Objects with no referencing record, now deleted
    pub orphans_removed: Vec<ObjectId>,
    /// Records whose object is missing; reported, never deleted
    pub dangling: Vec<ImageId>,
    /// Unreferenced objects younger than the grace period, left alone
    pub skipped_recent: usize,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.orphans_removed.is_empty() && self.dangling.is_empty()
    }
}
