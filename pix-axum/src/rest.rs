use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing, Json, Router,
};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use pix_blob::{BlobError, ImageId, ImageRecord};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    middlewares::{multipart::exceeded, ImageIntake},
    PixAxumError, PixAxumState,
};

/// Image document as the gallery client reads it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub upload_date: DateTime<Utc>,
    pub metadata: ImageMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

impl From<ImageRecord> for ImageDocument {
    fn from(record: ImageRecord) -> Self {
        Self {
            id: record.id.0,
            filename: record.filename,
            content_type: record.content_type,
            upload_date: record.upload_date,
            metadata: ImageMetadata {
                size: record.size,
                uploaded_by: record.uploaded_by,
            },
        }
    }
}

pub fn images_router(state: PixAxumState) -> Router<()> {
    Router::new()
        .route("/", routing::get(list_images))
        .route("/upload", routing::post(upload_image))
        .route("/{id}", routing::get(download_image).delete(delete_image))
        .with_state(state)
}

async fn upload_image(
    State(state): State<PixAxumState>,
    intake: ImageIntake,
) -> Result<(StatusCode, Json<ImageDocument>), PixAxumError> {
    let received = intake.bytes_received();
    let limit = state.multipart.max_file_size;

    let record = state
        .images
        .upload(intake.upload, intake.body)
        .await
        .map_err(|err| match err {
            BlobError::ValidationFailed { .. } | BlobError::UploadFailed { .. }
                if exceeded(&received, limit) =>
            {
                PixAxumError::payload_too_large(format!(
                    "File exceeds the maximum size of {} bytes",
                    limit.unwrap_or_default()
                ))
            }
            other => other.into(),
        })?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn list_images(
    State(state): State<PixAxumState>,
) -> Result<Json<Vec<ImageDocument>>, PixAxumError> {
    let records = state.images.list().await?;
    Ok(Json(records.into_iter().map(ImageDocument::from).collect()))
}

async fn download_image(
    State(state): State<PixAxumState>,
    Path(id): Path<String>,
) -> Result<Response, PixAxumError> {
    let (record, stream) = state
        .images
        .download(&ImageId::from(id.as_str()))
        .await?
        .into_parts();

    let image_id = record.id.clone();
    let body = Body::from_stream(stream.inspect_err(move |err| {
        warn!(image_id = %image_id, error = %err, "image stream failed mid-response");
    }));

    let headers = [
        (header::CONTENT_TYPE, record.content_type),
        (header::CONTENT_LENGTH, record.size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", header_safe(&record.filename)),
        ),
    ];
    Ok((headers, body).into_response())
}

async fn delete_image(
    State(state): State<PixAxumState>,
    Path(id): Path<String>,
) -> Result<StatusCode, PixAxumError> {
    state.images.delete(&ImageId::from(id.as_str())).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Filename restricted to printable ASCII without quotes or backslashes
fn header_safe(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pix_blob::{NewImageRecord, ObjectId};

    #[test]
    fn document_uses_gallery_field_names() {
        let record = NewImageRecord::new("cat.png", "image/png", 42, ObjectId::new())
            .with_uploaded_by(Some("ana".to_string()))
            .into_record(ImageId::from("abc123"));
        let json = serde_json::to_value(ImageDocument::from(record)).unwrap();

        assert_eq!(json["_id"], "abc123");
        assert_eq!(json["filename"], "cat.png");
        assert_eq!(json["contentType"], "image/png");
        assert!(json["uploadDate"].is_string());
        assert_eq!(json["metadata"]["size"], 42);
        assert_eq!(json["metadata"]["uploadedBy"], "ana");
        assert!(json.get("storageRef").is_none());
    }

    #[test]
    fn header_safe_replaces_quotes_and_non_ascii() {
        assert_eq!(header_safe("my \"cat\".png"), "my _cat_.png");
        assert_eq!(header_safe("café.png"), "caf_.png");
    }
}
