pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;

pub const CONTENT_TYPE_GZIP: &str = "application/gzip";
pub const METADATA_CREATED_AT: &str = "created-at";
pub const METADATA_SOURCE: &str = "source";
pub const SOURCE_AUTOMATED_BACKUP: &str = "automated-backup";

/// A file to put into the bucket.
#[derive(Debug, Clone)]
pub struct UploadRequest<'a> {
    pub local_path: &'a Path,
    pub key: &'a str,
    pub content_type: &'a str,
    pub metadata: HashMap<String, String>,
}

/// A listed object and the creation time resolved for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// The subset of bucket operations the backup cycle needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    fn scheme(&self) -> &str;

    async fn upload(&self, request: UploadRequest<'_>) -> Result<()>;

    /// Every object in the bucket, unscoped by prefix.
    async fn list(&self) -> Result<Vec<RemoteObject>>;

    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    fn uri_for(&self, key: &str) -> String {
        format!("{}://{}/{}", self.scheme(), self.bucket(), key)
    }
}

/// Metadata written alongside every uploaded backup.
pub fn backup_metadata(created_at: DateTime<Utc>) -> HashMap<String, String> {
    HashMap::from([
        (METADATA_CREATED_AT.to_string(), created_at.to_rfc3339()),
        (METADATA_SOURCE.to_string(), SOURCE_AUTOMATED_BACKUP.to_string()),
    ])
}

/// Prefers the `created-at` metadata entry, falling back to the store's own timestamp.
pub fn resolve_created_at(
    metadata: Option<&HashMap<String, String>>,
    last_modified: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    metadata
        .and_then(|m| m.get(METADATA_CREATED_AT))
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or(last_modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn metadata_timestamp_wins_over_last_modified() {
        let created = Utc.with_ymd_and_hms(2024, 3, 15, 2, 0, 0).unwrap();
        let modified = Utc.with_ymd_and_hms(2024, 3, 20, 9, 30, 0).unwrap();
        let metadata = backup_metadata(created);

        assert_eq!(resolve_created_at(Some(&metadata), Some(modified)), Some(created));
        assert_eq!(metadata.get(METADATA_SOURCE).map(String::as_str), Some("automated-backup"));
    }

    #[test]
    fn falls_back_when_metadata_missing_or_garbled() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 20, 9, 30, 0).unwrap();
        let garbled = HashMap::from([(METADATA_CREATED_AT.to_string(), "yesterday".to_string())]);

        assert_eq!(resolve_created_at(None, Some(modified)), Some(modified));
        assert_eq!(resolve_created_at(Some(&garbled), Some(modified)), Some(modified));
        assert_eq!(resolve_created_at(Some(&garbled), None), None);
    }
}
