use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pix_blob::BlobError;
use serde_json::json;

/// Feathers-style error classes used on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Timeout,
    PayloadTooLarge,
    GeneralError,
    Unavailable,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::GeneralError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::GeneralError => "GeneralError",
            ErrorKind::Unavailable => "Unavailable",
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PayloadTooLarge => "payload-too-large",
            ErrorKind::GeneralError => "general-error",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

/// An error raised by the HTTP layer itself, before storage is involved
#[derive(Debug)]
pub struct HttpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl HttpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

impl std::error::Error for HttpError {}

#[derive(Debug)]
pub struct PixAxumError(pub anyhow::Error);

impl PixAxumError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(HttpError::new(ErrorKind::BadRequest, message).into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self(HttpError::new(ErrorKind::PayloadTooLarge, message).into())
    }

    /// Wire class and client-facing message for this error
    fn classify(&self) -> (ErrorKind, String) {
        if let Some(http) = self.0.chain().find_map(|e| e.downcast_ref::<HttpError>()) {
            return (http.kind, http.message.clone());
        }

        match self.0.chain().find_map(|e| e.downcast_ref::<BlobError>()) {
            Some(blob) => classify_blob(blob),
            None => (ErrorKind::GeneralError, self.0.to_string()),
        }
    }
}

fn classify_blob(err: &BlobError) -> (ErrorKind, String) {
    match err {
        BlobError::ImageNotFound { .. } | BlobError::NotFound { .. } => {
            (ErrorKind::NotFound, "Image not found".to_string())
        }
        // Record exists but its bytes are gone
        BlobError::ObjectNotFound { .. } => {
            (ErrorKind::NotFound, "Image data not found".to_string())
        }
        BlobError::WriteIncomplete { .. } => {
            (ErrorKind::BadRequest, "Uploaded file is empty".to_string())
        }
        BlobError::UploadFailed { .. } | BlobError::ValidationFailed { .. } => {
            (ErrorKind::BadRequest, err.to_string())
        }
        BlobError::UploadTimedOut { .. } => (ErrorKind::Timeout, err.to_string()),
        BlobError::StorageUnavailable { .. } => {
            (ErrorKind::Unavailable, "Image storage is unavailable".to_string())
        }
        BlobError::Io { .. } | BlobError::Serialization { .. } => {
            (ErrorKind::GeneralError, "Server error".to_string())
        }
    }
}

impl From<anyhow::Error> for PixAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<BlobError> for PixAxumError {
    fn from(e: BlobError) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for PixAxumError {
    fn into_response(self) -> Response {
        let (kind, message) = self.classify();
        if kind.status().is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = json!({
            "name": kind.name(),
            "message": message,
            "code": kind.status().as_u16(),
            "className": kind.class_name(),
            "error": message,
        });
        (kind.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_errors_map_to_status_codes() {
        let cases = [
            (BlobError::image_not_found("x"), StatusCode::NOT_FOUND),
            (BlobError::write_incomplete("x"), StatusCode::BAD_REQUEST),
            (BlobError::validation("bad"), StatusCode::BAD_REQUEST),
            (
                BlobError::UploadTimedOut {
                    after: std::time::Duration::from_secs(1),
                },
                StatusCode::REQUEST_TIMEOUT,
            ),
            (
                BlobError::backend(std::io::Error::other("down")),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                BlobError::from(std::io::Error::other("disk")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(PixAxumError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn context_does_not_hide_the_blob_error() {
        let err = anyhow::Error::new(BlobError::image_not_found("x")).context("loading image");
        let (kind, message) = PixAxumError::from(err).classify();
        assert_eq!(kind, ErrorKind::NotFound);
        assert_eq!(message, "Image not found");
    }
}
