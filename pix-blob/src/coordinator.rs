use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::{
    BlobError, BlobResult, ByteStream, ChunkStore, CoordinatorConfig, ImageId, ImageIndex,
    ImageRecord, ImageUpload, NewImageRecord, OpenedImage, SweepReport, WriteHandle,
};

/// Coordinates the chunk store and the image index into upload, download,
/// delete and list operations.
///
/// There is no transaction spanning the two stores. A failed metadata insert
/// after a commit leaves an orphaned object unless `compensate_orphans` is set,
/// and a failed metadata delete after the chunks are gone leaves a dangling
/// record. [`ImageCoordinator::sweep`] reconciles both.
#[derive(Clone)]
pub struct ImageCoordinator {
    store: Arc<dyn ChunkStore>,
    index: Arc<dyn ImageIndex>,
    config: CoordinatorConfig,
}

impl ImageCoordinator {
    /// Create a coordinator over an already opened store and index
    pub fn new<S, I>(store: S, index: I, config: CoordinatorConfig) -> Self
    where
        S: ChunkStore + 'static,
        I: ImageIndex + 'static,
    {
        Self::from_shared(Arc::new(store), Arc::new(index), config)
    }

    /// Create from store and index that are shared elsewhere
    pub fn from_shared(
        store: Arc<dyn ChunkStore>,
        index: Arc<dyn ImageIndex>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    /// Store an image from a stream and record its metadata
    pub async fn upload(&self, upload: ImageUpload, body: ByteStream) -> BlobResult<ImageRecord> {
        self.validate(&upload)?;

        let mut handle = self.store.begin_write().await?;
        let written = match self.config.upload_timeout {
            Some(limit) => tokio::time::timeout(limit, self.write_body(&mut handle, body))
                .await
                .unwrap_or(Err(BlobError::UploadTimedOut { after: limit })),
            None => self.write_body(&mut handle, body).await,
        };

        if let Err(err) = written {
            warn!(
                object_id = %handle.object_id(),
                filename = %upload.filename,
                bytes = handle.bytes_written(),
                error = %err,
                "upload failed, aborting write"
            );
            if let Err(abort_err) = self.store.abort_write(handle).await {
                warn!(error = %abort_err, "failed to abort write");
            }
            return Err(err);
        }

        let size = handle.bytes_written();
        let storage_ref = self.store.commit_write(handle).await?;

        let draft = NewImageRecord::new(upload.filename, upload.content_type, size, storage_ref)
            .with_uploaded_by(upload.uploaded_by);
        match self.index.insert(draft.clone()).await {
            Ok(id) => {
                let record = draft.into_record(id);
                info!(
                    image_id = %record.id,
                    object_id = %record.storage_ref,
                    size = record.size,
                    "stored image"
                );
                Ok(record)
            }
            Err(err) => {
                self.handle_orphan(&draft, &err).await;
                Err(err)
            }
        }
    }

    /// Look up an image record
    pub async fn get(&self, id: &ImageId) -> BlobResult<ImageRecord> {
        self.index.find_by_id(id).await.map_err(|err| match err {
            BlobError::NotFound { .. } => BlobError::image_not_found(id.as_str()),
            other => other,
        })
    }

    /// Open an image for streaming
    pub async fn download(&self, id: &ImageId) -> BlobResult<OpenedImage> {
        let record = self.get(id).await?;
        let stream = self.store.open_read(&record.storage_ref).await?;
        debug!(image_id = %id, object_id = %record.storage_ref, "opened image");
        Ok(OpenedImage { record, stream })
    }

    /// All image records, newest first
    pub async fn list(&self) -> BlobResult<Vec<ImageRecord>> {
        self.index.list_all().await
    }

    /// Delete an image's chunks, then its record
    pub async fn delete(&self, id: &ImageId) -> BlobResult<()> {
        let record = self.get(id).await?;
        self.store.delete(&record.storage_ref).await?;
        self.index.delete_by_id(id).await.map_err(|err| match err {
            // Lost a race with a concurrent delete of the same id
            BlobError::NotFound { .. } => BlobError::image_not_found(id.as_str()),
            other => {
                warn!(
                    image_id = %id,
                    object_id = %record.storage_ref,
                    error = %other,
                    "chunks deleted but record remains, reference is dangling"
                );
                other
            }
        })?;
        info!(image_id = %id, object_id = %record.storage_ref, "deleted image");
        Ok(())
    }

    /// Delete orphaned objects and report dangling records.
    ///
    /// Objects committed less than `grace` ago are skipped: they may belong to
    /// an upload that has not recorded its metadata yet.
    ///
    /// Both listings must be complete before anything is deleted. An unreadable
    /// record or manifest fails the sweep with that error and nothing is removed.
    pub async fn sweep(&self, grace: Duration) -> BlobResult<SweepReport> {
        let objects = self.store.list_objects().await?;
        let records = self.index.list_all().await?;

        let referenced: HashSet<_> = records.iter().map(|r| &r.storage_ref).collect();
        let live: HashSet<_> = objects.iter().map(|o| &o.id).collect();
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero());

        let mut report = SweepReport::default();
        for object in objects.iter().filter(|o| !referenced.contains(&o.id)) {
            if object.committed_at > cutoff {
                report.skipped_recent += 1;
                continue;
            }
            self.store.delete(&object.id).await?;
            warn!(object_id = %object.id, size = object.size_bytes, "removed orphaned object");
            report.orphans_removed.push(object.id.clone());
        }

        for record in records.iter().filter(|r| !live.contains(&r.storage_ref)) {
            warn!(image_id = %record.id, object_id = %record.storage_ref, "dangling image record");
            report.dangling.push(record.id.clone());
        }

        info!(
            orphans = report.orphans_removed.len(),
            dangling = report.dangling.len(),
            skipped = report.skipped_recent,
            "sweep finished"
        );
        Ok(report)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Chunk size of the underlying store
    pub fn chunk_size(&self) -> usize {
        self.store.chunk_size()
    }

    fn validate(&self, upload: &ImageUpload) -> BlobResult<()> {
        if upload.filename.trim().is_empty() {
            return Err(BlobError::validation("filename must not be empty"));
        }
        if upload.content_type.trim().is_empty() {
            return Err(BlobError::validation("content type must not be empty"));
        }
        if let (Some(size), Some(max)) = (upload.size_hint, self.config.max_object_bytes) {
            if size > max {
                return Err(BlobError::validation(format!(
                    "object size {} exceeds maximum {}",
                    size, max
                )));
            }
        }
        Ok(())
    }

    async fn write_body(&self, handle: &mut WriteHandle, mut body: ByteStream) -> BlobResult<()> {
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| BlobError::UploadFailed { source })?;
            if let Some(max) = self.config.max_object_bytes {
                if handle.bytes_written() + chunk.len() as u64 > max {
                    return Err(BlobError::validation(format!(
                        "object exceeds maximum size of {} bytes",
                        max
                    )));
                }
            }
            self.store.write_chunk(handle, chunk).await?;
        }
        Ok(())
    }

    async fn handle_orphan(&self, draft: &NewImageRecord, err: &BlobError) {
        if !self.config.compensate_orphans {
            warn!(
                object_id = %draft.storage_ref,
                error = %err,
                "metadata insert failed, object left orphaned"
            );
            return;
        }

        match self.store.delete(&draft.storage_ref).await {
            Ok(()) => warn!(
                object_id = %draft.storage_ref,
                error = %err,
                "metadata insert failed, removed committed object"
            ),
            Err(delete_err) => warn!(
                object_id = %draft.storage_ref,
                error = %err,
                delete_error = %delete_err,
                "metadata insert failed and object cleanup failed, object is orphaned"
            ),
        }
    }
}
