// workstream-backup/src/backup/logic.rs
use anyhow::Context;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span};

use super::Stage;
use super::archive::compress_dump;
use super::db_dump::DatabaseDumper;
use super::retention::sweep_expired;
use super::retry::{BackoffPolicy, LinearBackoff};
use super::snapshot::Snapshot;
use crate::errors::{BackupError, Result};
use crate::storage::{CONTENT_TYPE_GZIP, ObjectStore, UploadRequest, backup_metadata};

/// Outcome of a successful backup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// Fully qualified location, e.g. `gs://bucket/2024/03/workstream-backup-....sql.gz`.
    pub remote_path: String,
    pub deleted: usize,
    pub attempts: u32,
}

/// Runs dump → compress → upload → local cleanup → retention sweep, retrying
/// the whole cycle on failure.
pub struct BackupOrchestrator {
    dumper: Arc<dyn DatabaseDumper>,
    store: Arc<dyn ObjectStore>,
    backoff: Box<dyn BackoffPolicy>,
    staging_dir: PathBuf,
    retention_days: u32,
}

impl BackupOrchestrator {
    pub fn new(
        dumper: Arc<dyn DatabaseDumper>,
        store: Arc<dyn ObjectStore>,
        staging_dir: PathBuf,
        retention_days: u32,
    ) -> Self {
        BackupOrchestrator {
            dumper,
            store,
            backoff: Box::new(LinearBackoff::default()),
            staging_dir,
            retention_days,
        }
    }

    pub fn with_backoff(mut self, backoff: impl BackoffPolicy + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    pub async fn execute(&self, max_attempts: u32) -> Result<BackupReport> {
        if max_attempts == 0 {
            return Err(BackupError::Config(
                "max attempts must be at least 1".to_string(),
            ));
        }

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            let snapshot = Snapshot::new(Utc::now(), &self.staging_dir);
            let span = info_span!("attempt", attempt, run_id = %snapshot.run_id);

            info!(parent: &span, "Backup attempt {}/{}", attempt, max_attempts);
            match self.run_cycle(&snapshot).instrument(span.clone()).await {
                Ok((remote_path, deleted)) => {
                    info!(parent: &span, "🎉 Backup process completed successfully: {}", remote_path);
                    return Ok(BackupReport {
                        remote_path,
                        deleted,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    error!(parent: &span, "❌ Backup attempt {} failed during {}: {}", attempt, stage_name(&e), e);
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt < max_attempts {
                        let delay = self.backoff.delay(attempt);
                        info!(parent: &span, "Retrying in {}ms...", delay.as_millis());
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let err = last_error
            .unwrap_or_else(|| BackupError::Config("no backup attempt was made".to_string()));
        error!("All backup attempts failed. Last error: {}", err);
        Err(err)
    }

    async fn run_cycle(&self, snapshot: &Snapshot) -> Result<(String, usize)> {
        let uploaded = self.produce(snapshot).await;
        // Runs on success and failure alike.
        snapshot.cleanup_local().await;
        let remote_path = uploaded?;

        let deleted = sweep_expired(self.store.as_ref(), self.retention_days, Utc::now())
            .await
            .map_err(|e| BackupError::at(Stage::Sweeping, e))?;
        Ok((remote_path, deleted))
    }

    async fn produce(&self, snapshot: &Snapshot) -> Result<String> {
        info!("Starting database backup {}", snapshot.name);

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("Failed to create staging directory {}", self.staging_dir.display()))
            .map_err(|e| BackupError::at(Stage::Dumping, e))?;
        self.dumper
            .dump(&snapshot.dump_path)
            .await
            .map_err(|e| BackupError::at(Stage::Dumping, e))?;

        compress_dump(&snapshot.dump_path, &snapshot.archive_path)
            .await
            .map_err(|e| BackupError::at(Stage::Compressing, e))?;

        let key = snapshot.remote_key();
        self.store
            .upload(UploadRequest {
                local_path: &snapshot.archive_path,
                key: &key,
                content_type: CONTENT_TYPE_GZIP,
                metadata: backup_metadata(snapshot.created_at),
            })
            .await
            .map_err(|e| BackupError::at(Stage::Uploading, e))?;

        let remote_path = self.store.uri_for(&key);
        info!("Backup uploaded: {}", remote_path);
        Ok(remote_path)
    }
}

fn stage_name(err: &BackupError) -> String {
    err.stage()
        .map(|stage| stage.to_string())
        .unwrap_or_else(|| "setup".to_string())
}
