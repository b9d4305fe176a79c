use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use pix_blob::{
    BlobResult, CoordinatorConfig, FsChunkStore, FsImageIndex, ImageCoordinator,
    MemoryChunkStore, MemoryImageIndex, DEFAULT_CHUNK_SIZE,
};

struct ServerDefaults;

impl ServerDefaults {
    const HOST: &'static str = "127.0.0.1";
    const PORT: u16 = 5000;
    const DATA_DIR: &'static str = "data";
    const MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
    const UPLOAD_TIMEOUT_SECS: u64 = 60;
}

/// Which backends hold chunks and records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Fs,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fs" | "file" | "disk" => Ok(StorageKind::Fs),
            "memory" | "mem" => Ok(StorageKind::Memory),
            other => Err(format!("unknown storage kind '{other}'")),
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageKind::Fs => f.write_str("fs"),
            StorageKind::Memory => f.write_str("memory"),
        }
    }
}

/// Server settings, read from the environment by [`ServerConfig::from_env`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub storage: StorageKind,
    pub chunk_size: usize,
    pub max_upload_bytes: u64,
    /// `None` disables the per-upload timeout
    pub upload_timeout: Option<Duration>,
    /// Allowed CORS origin; any origin when unset
    pub frontend_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ServerDefaults::HOST.to_string(),
            port: ServerDefaults::PORT,
            data_dir: PathBuf::from(ServerDefaults::DATA_DIR),
            storage: StorageKind::Fs,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: ServerDefaults::MAX_UPLOAD_BYTES,
            upload_timeout: Some(Duration::from_secs(ServerDefaults::UPLOAD_TIMEOUT_SECS)),
            frontend_url: None,
        }
    }
}

impl ServerConfig {
    /// In-memory storage with default limits, for tests and demos
    pub fn in_memory() -> Self {
        Self {
            storage: StorageKind::Memory,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = env_var_or("PIX_UPLOAD_TIMEOUT_SECS", ServerDefaults::UPLOAD_TIMEOUT_SECS);

        Self {
            host: env_var_or("HTTP_HOST", defaults.host),
            port: env_var_or("HTTP_PORT", defaults.port),
            data_dir: PathBuf::from(env_var_or(
                "PIX_DATA_DIR",
                ServerDefaults::DATA_DIR.to_string(),
            )),
            storage: env_var_or("PIX_STORAGE", defaults.storage),
            chunk_size: env_var_or("PIX_CHUNK_SIZE", defaults.chunk_size).max(1),
            max_upload_bytes: env_var_or("PIX_MAX_UPLOAD_BYTES", defaults.max_upload_bytes),
            // 0 disables the timeout
            upload_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            frontend_url: std::env::var("FRONTEND_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn with_max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let config = CoordinatorConfig::new().with_max_object_bytes(self.max_upload_bytes);
        match self.upload_timeout {
            Some(timeout) => config.with_upload_timeout(timeout),
            None => config.without_upload_timeout(),
        }
    }

    /// Open the configured backends and wrap them in a coordinator
    pub async fn open_coordinator(&self) -> BlobResult<ImageCoordinator> {
        let config = self.coordinator_config();
        let images = match self.storage {
            StorageKind::Fs => ImageCoordinator::new(
                FsChunkStore::open(self.data_dir.join("chunks"))
                    .await?
                    .with_chunk_size(self.chunk_size),
                FsImageIndex::open(&self.data_dir).await?,
                config,
            ),
            StorageKind::Memory => ImageCoordinator::new(
                MemoryChunkStore::with_chunk_size(self.chunk_size),
                MemoryImageIndex::new(),
                config,
            ),
        };
        tracing::info!(
            storage = %self.storage,
            data_dir = %self.data_dir.display(),
            chunk_size = images.chunk_size(),
            "image storage ready"
        );
        Ok(images)
    }
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Debug,
{
    std::env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or(default)
}
