// workstream-backup/src/backup/db_dump.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;
use which::which;

use crate::config::DatabaseConfig;

/// Produces a plain SQL dump of the database at `destination`.
#[async_trait]
pub trait DatabaseDumper: Send + Sync {
    async fn dump(&self, destination: &Path) -> Result<()>;
}

// Helper function to find pg_dump executable
fn find_pg_dump_executable() -> Result<PathBuf> {
    which("pg_dump")
        .context("pg_dump executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH.")
}

/// Dumps the database by shelling out to `pg_dump`.
pub struct PgDumpDumper {
    database: DatabaseConfig,
    executable: Option<PathBuf>,
}

impl PgDumpDumper {
    pub fn new(database: DatabaseConfig) -> Self {
        PgDumpDumper {
            database,
            executable: None,
        }
    }

    pub fn with_executable(database: DatabaseConfig, executable: PathBuf) -> Self {
        PgDumpDumper {
            database,
            executable: Some(executable),
        }
    }

    fn args(&self, destination: &Path) -> Vec<OsString> {
        // The password travels through PGPASSWORD, never the argument list.
        vec![
            "-h".into(),
            self.database.host.clone().into(),
            "-p".into(),
            self.database.port.to_string().into(),
            "-U".into(),
            self.database.user.clone().into(),
            "-d".into(),
            self.database.name.clone().into(),
            "-f".into(),
            destination.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl DatabaseDumper for PgDumpDumper {
    async fn dump(&self, destination: &Path) -> Result<()> {
        let pg_dump_path = match &self.executable {
            Some(path) => path.clone(),
            None => find_pg_dump_executable()?,
        };

        info!(
            "Creating database dump of {} on {}:{} to {}",
            self.database.name,
            self.database.host,
            self.database.port,
            destination.display()
        );

        let output = Command::new(&pg_dump_path)
            .args(self.args(destination))
            .env("PGPASSWORD", &self.database.password)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", pg_dump_path.display()))?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "pg_dump for database {} failed with status: {}\nStderr: {}",
                self.database.name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        info!("✓ Database dump created successfully");
        Ok(())
    }
}
