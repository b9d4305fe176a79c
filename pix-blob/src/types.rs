use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

/// Stream of bytes for object content
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Identifier of a stored object in the chunk store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    /// Generate a new random object ID
    pub fn new() -> Self {
        Self(format!("obj_{}", Uuid::new_v4().simple()))
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is safe to use as a single path component
    pub(crate) fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an image record in the metadata index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub String);

impl ImageId {
    /// Generate a new random image ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Create from existing string
    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    /// Get the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn is_path_safe(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Request to store an image
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: String,
    pub size_hint: Option<u64>,
    pub uploaded_by: Option<String>,
}

impl ImageUpload {
    pub fn new<F: Into<String>, C: Into<String>>(filename: F, content_type: C) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size_hint: None,
            uploaded_by: None,
        }
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn with_uploaded_by<S: Into<String>>(mut self, actor: S) -> Self {
        self.uploaded_by = Some(actor.into());
        self
    }
}

/// Metadata for one uploaded image and the object that holds its bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: ImageId,
    pub filename: String,
    pub content_type: String,
    pub upload_date: DateTime<Utc>,
    pub size: u64,
    pub storage_ref: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

/// An image record before the index has assigned it an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewImageRecord {
    pub filename: String,
    pub content_type: String,
    pub upload_date: DateTime<Utc>,
    pub size: u64,
    pub storage_ref: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
}

impl NewImageRecord {
    /// Record stamped with the current time
    pub fn new<F: Into<String>, C: Into<String>>(
        filename: F,
        content_type: C,
        size: u64,
        storage_ref: ObjectId,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            upload_date: Utc::now(),
            size,
            storage_ref,
            uploaded_by: None,
        }
    }

    pub fn with_upload_date(mut self, upload_date: DateTime<Utc>) -> Self {
        self.upload_date = upload_date;
        self
    }

    pub fn with_uploaded_by(mut self, uploaded_by: Option<String>) -> Self {
        self.uploaded_by = uploaded_by;
        self
    }

    /// Attach the id assigned by the index
    pub fn into_record(self, id: ImageId) -> ImageRecord {
        ImageRecord {
            id,
            filename: self.filename,
            content_type: self.content_type,
            upload_date: self.upload_date,
            size: self.size,
            storage_ref: self.storage_ref,
            uploaded_by: self.uploaded_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_path_safe() {
        assert!(ObjectId::new().is_path_safe());
        assert!(ImageId::new().is_path_safe());
        assert!(!ObjectId::from_string("../etc".to_string()).is_path_safe());
        assert!(!ImageId::from_string("a/b".to_string()).is_path_safe());
        assert!(!ImageId::from_string(String::new()).is_path_safe());
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = NewImageRecord::new("cat.png", "image/png", 3, ObjectId::from_string("obj_1".into()))
            .into_record(ImageId::from("abc"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["contentType"], "image/png");
        assert_eq!(json["storageRef"], "obj_1");
        assert!(json.get("uploadedBy").is_none());
    }
}
