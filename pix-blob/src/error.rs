use std::time::Duration;

use thiserror::Error;

/// Result type for blob and index operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur in the chunk store, the metadata index or the coordinator
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Object not found: {id}")]
    ObjectNotFound { id: String },

    /// Lookup miss inside the metadata index
    #[error("Record not found: {id}")]
    NotFound { id: String },

    /// Lookup miss as seen by callers of the coordinator
    #[error("Image not found: {id}")]
    ImageNotFound { id: String },

    #[error("Write for object {id} committed with no chunks")]
    WriteIncomplete { id: String },

    #[error("Upload failed: {source}")]
    UploadFailed {
        #[source]
        source: std::io::Error,
    },

    #[error("Upload timed out after {}s", after.as_secs())]
    UploadTimedOut { after: Duration },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Storage unavailable: {source}")]
    StorageUnavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl BlobError {
    /// Wrap any backend error as `StorageUnavailable`
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::StorageUnavailable {
            source: Box::new(error),
        }
    }

    pub fn object_not_found<S: Into<String>>(id: S) -> Self {
        Self::ObjectNotFound { id: id.into() }
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn image_not_found<S: Into<String>>(id: S) -> Self {
        Self::ImageNotFound { id: id.into() }
    }

    pub fn write_incomplete<S: Into<String>>(id: S) -> Self {
        Self::WriteIncomplete { id: id.into() }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// True for every kind of lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound { .. } | Self::NotFound { .. } | Self::ImageNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_misses_are_not_found() {
        assert!(BlobError::object_not_found("a").is_not_found());
        assert!(BlobError::not_found("a").is_not_found());
        assert!(BlobError::image_not_found("a").is_not_found());
        assert!(!BlobError::write_incomplete("a").is_not_found());
        assert!(!BlobError::validation("bad").is_not_found());
    }

    #[test]
    fn timeout_message_reports_seconds() {
        let err = BlobError::UploadTimedOut {
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Upload timed out after 30s");
    }
}
