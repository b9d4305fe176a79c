use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::format::{self, MAX_PAYLOAD_LEN};
use super::{ChunkStore, ObjectInfo, WriteHandle};
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::{BlobError, BlobResult, ByteStream, ObjectId};

const OBJECTS_DIR: &str = "objects";
const PENDING_DIR: &str = "pending";
const MANIFEST_FILE: &str = "manifest.json";

/// Written next to the chunk files when an object is committed
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectManifest {
    id: ObjectId,
    chunk_count: u32,
    size_bytes: u64,
    chunk_size: usize,
    format_version: u8,
    committed_at: DateTime<Utc>,
}

/// Filesystem chunk store.
///
/// Layout under `root`:
///
/// ```text
/// pending/<object id>/00000000.chunk   writes in progress
/// objects/<object id>/00000000.chunk   committed objects
/// objects/<object id>/manifest.json
/// ```
///
/// A commit renames the pending directory into `objects/`, so readers only
/// ever see complete objects. The store assumes it is the only process using
/// `root`: stale pending writes are discarded when it is opened.
#[derive(Debug, Clone)]
pub struct FsChunkStore {
    root: PathBuf,
    chunk_size: usize,
}

impl FsChunkStore {
    /// Open (and create if needed) a store rooted at `root`
    pub async fn open<P: Into<PathBuf>>(root: P) -> BlobResult<Self> {
        let root = root.into();
        for dir in [OBJECTS_DIR, PENDING_DIR] {
            fs::create_dir_all(root.join(dir))
                .await
                .map_err(BlobError::backend)?;
        }

        let store = Self {
            root,
            chunk_size: DEFAULT_CHUNK_SIZE,
        };
        store.discard_stale_writes().await?;
        info!(root = %store.root.display(), "opened chunk store");
        Ok(store)
    }

    /// Override the on-disk chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_PAYLOAD_LEN);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pending_dir(&self, id: &ObjectId) -> PathBuf {
        self.root.join(PENDING_DIR).join(id.as_str())
    }

    fn object_dir(&self, id: &ObjectId) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(id.as_str())
    }

    async fn discard_stale_writes(&self) -> BlobResult<()> {
        let mut entries = fs::read_dir(self.root.join(PENDING_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            warn!(path = %entry.path().display(), "discarding interrupted write");
            remove_dir_if_present(&entry.path()).await?;
        }
        Ok(())
    }

    /// Flush the tail chunk, write the manifest and move `pending` into `objects/`
    async fn publish(&self, mut handle: WriteHandle, pending: &Path) -> BlobResult<ObjectManifest> {
        let id = handle.object_id().clone();
        if let Some((index, chunk)) = handle.finish() {
            write_chunk_file(pending, index, &chunk).await?;
        }

        if handle.chunks_emitted() == 0 {
            return Err(BlobError::write_incomplete(id.as_str()));
        }

        let manifest = ObjectManifest {
            id: id.clone(),
            chunk_count: handle.chunks_emitted(),
            size_bytes: handle.bytes_written(),
            chunk_size: self.chunk_size,
            format_version: format::FORMAT_VERSION,
            committed_at: Utc::now(),
        };
        write_synced(&pending.join(MANIFEST_FILE), &serde_json::to_vec(&manifest)?).await?;
        fs::rename(pending, self.object_dir(&id)).await?;
        Ok(manifest)
    }

    async fn read_manifest(&self, id: &ObjectId) -> BlobResult<ObjectManifest> {
        if !id.is_path_safe() {
            return Err(BlobError::object_not_found(id.as_str()));
        }
        let path = self.object_dir(id).join(MANIFEST_FILE);
        match fs::read(&path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BlobError::object_not_found(id.as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn chunk_path(dir: &Path, index: u32) -> PathBuf {
    dir.join(format!("{:08}.chunk", index))
}

async fn write_chunk_file(dir: &Path, index: u32, payload: &Bytes) -> io::Result<()> {
    let header = format::encode_header(index, payload.len())?;
    let mut file = fs::File::create(chunk_path(dir, index)).await?;
    file.write_all(&header).await?;
    file.write_all(payload).await?;
    file.sync_data().await?;
    Ok(())
}

/// Write `contents` to `path` and flush it to disk before returning
pub(crate) async fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    Ok(())
}

async fn read_chunk_file(dir: &Path, index: u32) -> io::Result<Bytes> {
    let raw = fs::read(chunk_path(dir, index)).await?;
    format::decode_chunk(index, raw)
}

async fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl ChunkStore for FsChunkStore {
    async fn begin_write(&self) -> BlobResult<WriteHandle> {
        loop {
            let id = ObjectId::new();
            // create_dir fails on an existing directory, which is what reserves the id
            match fs::create_dir(self.pending_dir(&id)).await {
                Ok(()) => {
                    debug!(object_id = %id, "reserved object");
                    return Ok(WriteHandle::new(id, self.chunk_size));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(BlobError::backend(e)),
            }
        }
    }

    async fn write_chunk(&self, handle: &mut WriteHandle, bytes: Bytes) -> BlobResult<()> {
        let dir = self.pending_dir(handle.object_id());
        for (index, chunk) in handle.segment(bytes) {
            write_chunk_file(&dir, index, &chunk).await?;
        }
        Ok(())
    }

    async fn commit_write(&self, handle: WriteHandle) -> BlobResult<ObjectId> {
        let id = handle.object_id().clone();
        let pending = self.pending_dir(&id);

        match self.publish(handle, &pending).await {
            Ok(manifest) => {
                debug!(
                    object_id = %id,
                    chunks = manifest.chunk_count,
                    size = manifest.size_bytes,
                    "committed object"
                );
                Ok(id)
            }
            Err(err) => {
                // The handle is gone, so nothing else would release the reservation
                if let Err(cleanup) = remove_dir_if_present(&pending).await {
                    warn!(object_id = %id, error = %cleanup, "failed to remove pending write");
                }
                Err(err)
            }
        }
    }

    async fn abort_write(&self, handle: WriteHandle) -> BlobResult<()> {
        remove_dir_if_present(&self.pending_dir(handle.object_id())).await?;
        debug!(object_id = %handle.object_id(), "aborted write");
        Ok(())
    }

    async fn open_read(&self, id: &ObjectId) -> BlobResult<ByteStream> {
        let manifest = self.read_manifest(id).await?;
        let dir = self.object_dir(id);

        let stream = async_stream::stream! {
            for index in 0..manifest.chunk_count {
                match read_chunk_file(&dir, index).await {
                    Ok(chunk) => yield Ok(chunk),
                    Err(e) => {
                        yield Err(io::Error::new(
                            e.kind(),
                            format!("Failed to read chunk {} of {}: {}", index, manifest.id, e),
                        ));
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn delete(&self, id: &ObjectId) -> BlobResult<()> {
        if !id.is_path_safe() {
            return Ok(());
        }

        // Move out of objects/ first so readers stop seeing the object at once
        let doomed = self
            .root
            .join(PENDING_DIR)
            .join(format!("{}.deleted", id.as_str()));
        match fs::rename(self.object_dir(id), &doomed).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        remove_dir_if_present(&doomed).await?;
        debug!(object_id = %id, "deleted object");
        Ok(())
    }

    async fn list_objects(&self) -> BlobResult<Vec<ObjectInfo>> {
        let mut entries = fs::read_dir(self.root.join(OBJECTS_DIR)).await?;
        let mut infos = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let id = ObjectId::from_string(name);
            match self.read_manifest(&id).await {
                Ok(manifest) => infos.push(ObjectInfo {
                    id,
                    size_bytes: manifest.size_bytes,
                    chunk_count: manifest.chunk_count,
                    committed_at: manifest.committed_at,
                }),
                // Deleted between read_dir and here
                Err(BlobError::ObjectNotFound { .. }) => continue,
                Err(e) => {
                    warn!(object_id = %id, error = %e, "unreadable object manifest");
                    return Err(e);
                }
            }
        }
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}
