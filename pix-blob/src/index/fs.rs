use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use super::{newest_first, ImageIndex};
use crate::store::write_synced;
use crate::{BlobError, BlobResult, ImageId, ImageRecord, NewImageRecord};

const RECORDS_DIR: &str = "records";

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    seq: u64,
    #[serde(flatten)]
    record: ImageRecord,
}

/// Image index keeping one JSON document per record under `<root>/records/`
pub struct FsImageIndex {
    dir: PathBuf,
    next_seq: AtomicU64,
}

impl FsImageIndex {
    /// Open (and create if needed) an index rooted at `root`
    pub async fn open<P: AsRef<Path>>(root: P) -> BlobResult<Self> {
        let dir = root.as_ref().join(RECORDS_DIR);
        fs::create_dir_all(&dir).await.map_err(BlobError::backend)?;

        let index = Self {
            dir,
            next_seq: AtomicU64::new(0),
        };
        index.discard_stale_writes().await?;

        // Sequence recovery only needs the readable records; list_all reports the rest
        let mut next_seq = 0;
        let mut records = 0;
        for (path, parsed) in index.load_all().await? {
            match parsed {
                Ok(stored) => {
                    next_seq = next_seq.max(stored.seq + 1);
                    records += 1;
                }
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable image record"),
            }
        }
        index.next_seq.store(next_seq, Ordering::SeqCst);

        info!(dir = %index.dir.display(), records, "opened image index");
        Ok(index)
    }

    fn record_path(&self, id: &ImageId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }

    async fn discard_stale_writes(&self) -> BlobResult<()> {
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
                warn!(path = %path.display(), "discarding interrupted record write");
                match fs::remove_file(&path).await {
                    Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Every record file, parsed. Parse failures are returned per file.
    async fn load_all(&self) -> BlobResult<Vec<(PathBuf, serde_json::Result<StoredRecord>)>> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut loaded = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                // Deleted concurrently
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let parsed = serde_json::from_slice::<StoredRecord>(&raw);
            loaded.push((path, parsed));
        }
        Ok(loaded)
    }
}

#[async_trait]
impl ImageIndex for FsImageIndex {
    async fn insert(&self, record: NewImageRecord) -> BlobResult<ImageId> {
        let mut id = ImageId::new();
        while fs::try_exists(self.record_path(&id)).await? {
            id = ImageId::new();
        }

        let stored = StoredRecord {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            record: record.into_record(id.clone()),
        };

        // Write aside then rename, so a record file is never seen half-written
        let path = self.record_path(&id);
        let tmp = path.with_extension("json.tmp");
        write_synced(&tmp, &serde_json::to_vec_pretty(&stored)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(id)
    }

    async fn find_by_id(&self, id: &ImageId) -> BlobResult<ImageRecord> {
        if !id.is_path_safe() {
            return Err(BlobError::not_found(id.as_str()));
        }
        match fs::read(self.record_path(id)).await {
            Ok(raw) => Ok(serde_json::from_slice::<StoredRecord>(&raw)?.record),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::not_found(id.as_str())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> BlobResult<Vec<ImageRecord>> {
        let mut entries = Vec::new();
        for (path, parsed) in self.load_all().await? {
            match parsed {
                Ok(stored) => entries.push((stored.seq, stored.record)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable image record");
                    return Err(e.into());
                }
            }
        }
        Ok(newest_first(entries))
    }

    async fn delete_by_id(&self, id: &ImageId) -> BlobResult<()> {
        if !id.is_path_safe() {
            return Err(BlobError::not_found(id.as_str()));
        }
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::not_found(id.as_str())),
            Err(e) => Err(e.into()),
        }
    }
}
