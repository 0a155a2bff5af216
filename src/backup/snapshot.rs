// workstream-backup/src/backup/snapshot.rs
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const BACKUP_NAME_PREFIX: &str = "workstream-backup";
pub const ARCHIVE_EXTENSION: &str = "sql.gz";

/// Logical backup name, e.g. `workstream-backup-2024-03-15-02-00-00`.
pub fn logical_name(created_at: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        BACKUP_NAME_PREFIX,
        created_at.format("%Y-%m-%d-%H-%M-%S")
    )
}

/// Object key `<YYYY>/<MM>/<logical-name>.sql.gz`, always derived from the creation time.
pub fn remote_key(created_at: DateTime<Utc>) -> String {
    format!(
        "{}/{}.{}",
        created_at.format("%Y/%m"),
        logical_name(created_at),
        ARCHIVE_EXTENSION
    )
}

/// Local artifacts of a single backup attempt.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub run_id: String,
    pub dump_path: PathBuf,
    pub archive_path: PathBuf,
}

impl Snapshot {
    pub fn new(created_at: DateTime<Utc>, staging_dir: &Path) -> Self {
        let run_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        Self::with_run_id(created_at, staging_dir, run_id)
    }

    pub fn with_run_id(created_at: DateTime<Utc>, staging_dir: &Path, run_id: String) -> Self {
        let name = logical_name(created_at);
        // The run id keeps overlapping runs from sharing staging files.
        let stem = format!("{}-{}", name, run_id);
        Snapshot {
            created_at,
            dump_path: staging_dir.join(format!("{}.sql", stem)),
            archive_path: staging_dir.join(format!("{}.{}", stem, ARCHIVE_EXTENSION)),
            name,
            run_id,
        }
    }

    pub fn remote_key(&self) -> String {
        remote_key(self.created_at)
    }

    /// Best-effort removal of both staging files.
    pub async fn cleanup_local(&self) {
        for path in [&self.dump_path, &self.archive_path] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Deleted local file: {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("⚠️ Failed to delete local file {}: {}", path.display(), e),
            }
        }
    }
}
