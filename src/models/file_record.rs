use crate::entities::blob_files;
use crate::models::blob_id::{BlobId, InvalidBlobId};
use chrono::{DateTime, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use std::path::Path;
use utoipa::ToSchema;

/// Metadata describing one stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    #[serde(rename = "_id")]
    #[schema(value_type = String, example = "507f1f77bcf86cd799439011")]
    pub id: BlobId,
    /// Name supplied by the uploader. Untrusted.
    pub filename: String,
    #[serde(rename = "uploadDate")]
    pub upload_date: DateTime<Utc>,
    pub size: i64,
    pub sha256: String,
}

impl FileRecord {
    /// Lowercased extension of the declared filename, without the dot.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
    }

    pub fn into_active_model(self, chunk_size: i32) -> blob_files::ActiveModel {
        blob_files::ActiveModel {
            id: Set(self.id.to_hex()),
            filename: Set(self.filename),
            upload_date: Set(self.upload_date),
            length: Set(self.size),
            chunk_size: Set(chunk_size),
            sha256: Set(self.sha256),
        }
    }
}

impl TryFrom<blob_files::Model> for FileRecord {
    type Error = InvalidBlobId;

    fn try_from(model: blob_files::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id.parse()?,
            filename: model.filename,
            upload_date: model.upload_date,
            size: model.length,
            sha256: model.sha256,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(filename: &str) -> FileRecord {
        FileRecord {
            id: "507f1f77bcf86cd799439011".parse().unwrap(),
            filename: filename.to_string(),
            upload_date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            size: 42,
            sha256: "ab".repeat(32),
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(record("Photo.PNG").extension().as_deref(), Some("png"));
        assert_eq!(record("archive.tar.gz").extension().as_deref(), Some("gz"));
        assert_eq!(record("README").extension(), None);
        assert_eq!(record(".hidden").extension(), None);
    }

    #[test]
    fn test_json_field_names() {
        let json = serde_json::to_value(record("a.txt")).unwrap();
        assert_eq!(json["_id"], "507f1f77bcf86cd799439011");
        assert_eq!(json["filename"], "a.txt");
        assert_eq!(json["size"], 42);
        assert!(json["uploadDate"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
    }

    #[test]
    fn test_model_conversion() {
        let model = blob_files::Model {
            id: "507f1f77bcf86cd799439011".to_string(),
            filename: "a.txt".to_string(),
            upload_date: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            length: 42,
            chunk_size: 1024,
            sha256: "ab".repeat(32),
        };
        assert_eq!(FileRecord::try_from(model).unwrap(), record("a.txt"));

        let bad = blob_files::Model {
            id: "not-an-id".to_string(),
            filename: "a.txt".to_string(),
            upload_date: Utc::now(),
            length: 0,
            chunk_size: 1024,
            sha256: String::new(),
        };
        assert!(FileRecord::try_from(bad).is_err());
    }
}
