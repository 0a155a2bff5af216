mod logic;
pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod retention;
pub(crate) mod retry;
pub(crate) mod snapshot;

use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::{BackupError, Result};
use retry::LinearBackoff;
use crate::storage::s3::S3ObjectStore;

pub use db_dump::PgDumpDumper;
pub use logic::{BackupOrchestrator, BackupReport};

/// Steps of one backup attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dumping,
    Compressing,
    Uploading,
    Sweeping,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dumping => "dump",
            Stage::Compressing => "compress",
            Stage::Uploading => "upload",
            Stage::Sweeping => "retention sweep",
        };
        f.write_str(name)
    }
}

/// Public entry point for one backup run (manual or scheduled).
///
/// Returns `Ok(None)` without touching the database or the bucket when backups
/// are disabled or not fully configured.
pub async fn execute_backup(app_config: &AppConfig, max_attempts: u32) -> Result<Option<BackupReport>> {
    let Some(backup_config) = &app_config.backup else {
        info!("Backup service not available, nothing to do");
        return Ok(None);
    };

    let store = S3ObjectStore::connect(&backup_config.storage)
        .await
        .map_err(|e| BackupError::Config(format!("{:#}", e)))?;
    let dumper = match &backup_config.pg_dump_path {
        Some(path) => PgDumpDumper::with_executable(backup_config.database.clone(), path.clone()),
        None => PgDumpDumper::new(backup_config.database.clone()),
    };

    let orchestrator = BackupOrchestrator::new(
        Arc::new(dumper),
        Arc::new(store),
        backup_config.staging_dir.clone(),
        backup_config.retention_days,
    )
    .with_backoff(LinearBackoff {
        step: app_config.retry_step,
    });
    orchestrator.execute(max_attempts).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::full_env;
    use crate::config::{KEY_BUCKET_NAME, KEY_ENABLED, RawEnvConfig};
    use std::collections::HashMap;

    fn app_config(env: HashMap<&'static str, &'static str>) -> anyhow::Result<AppConfig> {
        AppConfig::from_raw(RawEnvConfig::from_lookup(|key| {
            env.get(key).map(|v| v.to_string())
        }))
    }

    #[tokio::test]
    async fn disabled_backup_is_a_no_op() -> anyhow::Result<()> {
        let mut env = full_env();
        env.remove(KEY_ENABLED);
        let config = app_config(env)?;

        let outcome = execute_backup(&config, 3).await?;
        assert!(outcome.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn missing_bucket_is_a_no_op() -> anyhow::Result<()> {
        let mut env = full_env();
        env.remove(KEY_BUCKET_NAME);
        let config = app_config(env)?;

        let outcome = execute_backup(&config, 3).await?;
        assert!(outcome.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_credentials_are_a_config_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut config = app_config(full_env())?;
        if let Some(backup) = config.backup.as_mut() {
            backup.storage.credentials_path = dir.path().join("missing-key.json");
        }

        let err = execute_backup(&config, 1).await.unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
        assert!(err.to_string().contains("missing-key.json"));
        Ok(())
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Dumping.to_string(), "dump");
        assert_eq!(Stage::Sweeping.to_string(), "retention sweep");
    }
}
