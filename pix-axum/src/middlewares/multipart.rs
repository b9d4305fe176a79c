use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{FromRequest, Request},
    http::header,
};
use bytes::Bytes;
use futures::StreamExt;
use pix_blob::{ByteStream, ImageUpload};
use tracing::debug;

use crate::{PixAxumError, PixAxumState};

/// Configuration for streaming image intake from multipart/form-data
#[derive(Debug, Clone)]
pub struct MultipartConfig {
    /// Form field carrying the file
    pub file_field: String,
    /// Optional text field naming the uploader; only read when it precedes the file
    pub uploaded_by_field: String,
    /// Required prefix of the file part's content type (empty = all allowed)
    pub content_type_prefix: String,
    /// Maximum file size in bytes (None = unlimited)
    pub max_file_size: Option<u64>,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            file_field: "image".to_string(),
            uploaded_by_field: "uploadedBy".to_string(),
            content_type_prefix: "image/".to_string(),
            max_file_size: Some(5 * 1024 * 1024),
        }
    }
}

impl MultipartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum file size in bytes
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = Some(size);
        self
    }

    /// Set the form field name that carries the file
    pub fn file_field(mut self, field_name: &str) -> Self {
        self.file_field = field_name.to_string();
        self
    }

    /// Only accept file parts whose content type starts with `prefix`
    pub fn allow_content_type_prefix(mut self, prefix: &str) -> Self {
        self.content_type_prefix = prefix.to_string();
        self
    }

    fn allows(&self, content_type: &str) -> bool {
        self.content_type_prefix.is_empty()
            || content_type
                .to_ascii_lowercase()
                .starts_with(&self.content_type_prefix)
    }
}

/// Extractor that locates the image part of a multipart request and exposes
/// it as a byte stream without buffering the file.
///
/// Parts before the file field are read (small text fields) or skipped; the
/// request body after the file part is never consumed. The stream fails once
/// more than `max_file_size` bytes have arrived.
pub struct ImageIntake {
    pub upload: ImageUpload,
    pub body: ByteStream,
    received: Arc<AtomicU64>,
}

impl ImageIntake {
    /// Bytes of the file part pulled from the client so far
    pub fn bytes_received(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.received)
    }

    /// Parse the request head and advance to the file part
    pub async fn from_request_with(
        req: Request,
        config: &MultipartConfig,
    ) -> Result<Self, PixAxumError> {
        let boundary = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|ct| multer::parse_boundary(ct).ok())
            .ok_or_else(|| PixAxumError::bad_request("No file uploaded"))?;

        let mut multipart = multer::Multipart::new(req.into_body().into_data_stream(), boundary);
        let mut uploaded_by = None;

        loop {
            let field = multipart
                .next_field()
                .await
                .map_err(|e| PixAxumError::bad_request(format!("Malformed multipart body: {e}")))?
                .ok_or_else(|| PixAxumError::bad_request("No file uploaded"))?;

            let name = field.name().unwrap_or_default().to_string();
            if name == config.uploaded_by_field {
                let value = field
                    .text()
                    .await
                    .map_err(|e| PixAxumError::bad_request(format!("Malformed multipart body: {e}")))?;
                uploaded_by = Some(value).filter(|v| !v.trim().is_empty());
                continue;
            }
            if name != config.file_field {
                debug!(field = %name, "skipping multipart field");
                continue;
            }

            let content_type = field
                .content_type()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            if !config.allows(&content_type) {
                return Err(PixAxumError::bad_request(format!(
                    "Only image files are allowed, got '{content_type}'"
                )));
            }

            let filename = field
                .file_name()
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| config.file_field.clone());

            let received = Arc::new(AtomicU64::new(0));
            let counter = Arc::clone(&received);
            let limit = config.max_file_size;
            let body = field.map(move |chunk| -> io::Result<Bytes> {
                let bytes = chunk.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                if exceeded(&counter, limit) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "file exceeds the upload size limit",
                    ));
                }
                Ok(bytes)
            });

            let mut upload = ImageUpload::new(filename, content_type);
            if let Some(actor) = uploaded_by {
                upload = upload.with_uploaded_by(actor);
            }
            debug!(filename = %upload.filename, content_type = %upload.content_type, "receiving image");

            return Ok(Self {
                upload,
                body: Box::pin(body),
                received,
            });
        }
    }
}

/// Whether more than `limit` bytes of the file part have arrived
pub(crate) fn exceeded(received: &AtomicU64, limit: Option<u64>) -> bool {
    limit.is_some_and(|max| received.load(Ordering::Relaxed) > max)
}

impl FromRequest<PixAxumState> for ImageIntake {
    type Rejection = PixAxumError;

    async fn from_request(req: Request, state: &PixAxumState) -> Result<Self, Self::Rejection> {
        Self::from_request_with(req, &state.multipart).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_filter_is_prefix_based() {
        let config = MultipartConfig::new();
        assert!(config.allows("image/png"));
        assert!(config.allows("IMAGE/webp"));
        assert!(!config.allows("text/plain"));
        assert!(!config.allows("application/octet-stream"));

        let any = MultipartConfig::new().allow_content_type_prefix("");
        assert!(any.allows("text/plain"));
    }

    #[test]
    fn exceeded_compares_against_limit() {
        let received = AtomicU64::new(11);
        assert!(exceeded(&received, Some(10)));
        assert!(!exceeded(&received, Some(11)));
        assert!(!exceeded(&received, None));
    }
}
