use std::time::Duration;

/// Default on-disk chunk size (255 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;

/// Configuration for the upload/download/delete coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Absolute max size allowed for a single object (safety guard)
    pub max_object_bytes: Option<u64>,

    /// Upper bound on the whole chunked-write sequence of one upload
    pub upload_timeout: Option<Duration>,

    /// If true: delete the committed object when recording its metadata fails
    pub compensate_orphans: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_object_bytes: None,
            upload_timeout: Some(Duration::from_secs(60)),
            compensate_orphans: true,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max object size
    pub fn with_max_object_bytes(mut self, bytes: u64) -> Self {
        self.max_object_bytes = Some(bytes);
        self
    }

    /// Set the upload timeout
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = Some(timeout);
        self
    }

    /// Let uploads run for as long as the input stream stays open
    pub fn without_upload_timeout(mut self) -> Self {
        self.upload_timeout = None;
        self
    }

    /// Leave orphaned objects in place when metadata insertion fails
    pub fn keep_orphans(mut self) -> Self {
        self.compensate_orphans = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = CoordinatorConfig::new()
            .with_max_object_bytes(5 * 1024 * 1024)
            .without_upload_timeout()
            .keep_orphans();

        assert_eq!(config.max_object_bytes, Some(5 * 1024 * 1024));
        assert!(config.upload_timeout.is_none());
        assert!(!config.compensate_orphans);
    }
}
