// workstream-backup/src/config/mod.rs
use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

pub const KEY_ENABLED: &str = "BACKUP_ENABLED";
pub const KEY_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const KEY_BUCKET_NAME: &str = "GCP_BUCKET_NAME";
pub const KEY_CREDENTIALS_PATH: &str = "GCP_SERVICE_ACCOUNT_KEY_PATH";
pub const KEY_DB_HOST: &str = "POSTGRES_HOST";
pub const KEY_DB_PORT: &str = "POSTGRES_PORT";
pub const KEY_DB_USER: &str = "POSTGRES_USER";
pub const KEY_DB_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const KEY_DB_NAME: &str = "POSTGRES_DB";
pub const KEY_RETENTION_DAYS: &str = "BACKUP_RETENTION_DAYS";
pub const KEY_SCHEDULE: &str = "BACKUP_SCHEDULE";
pub const KEY_MAX_ATTEMPTS: &str = "BACKUP_MAX_ATTEMPTS";
pub const KEY_RETRY_STEP_MS: &str = "BACKUP_RETRY_STEP_MS";
pub const KEY_STAGING_DIR: &str = "BACKUP_STAGING_DIR";
pub const KEY_STORAGE_ENDPOINT: &str = "BACKUP_STORAGE_ENDPOINT";
pub const KEY_STORAGE_REGION: &str = "BACKUP_STORAGE_REGION";
pub const KEY_PG_DUMP_PATH: &str = "PG_DUMP_PATH";

pub const DEFAULT_DB_NAME: &str = "workstream_cockpit";
pub const DEFAULT_DB_PORT: u16 = 5432;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_SCHEDULE: &str = "0 2 * * *";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_STEP_MS: u32 = 2000;
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_STORAGE_REGION: &str = "auto";

/// Raw key/value settings as found in the environment. Empty values count as unset.
#[derive(Clone, Default)]
pub struct RawEnvConfig {
    pub backup_enabled: Option<String>,
    pub project_id: Option<String>,
    pub bucket_name: Option<String>,
    pub credentials_path: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_name: Option<String>,
    pub retention_days: Option<String>,
    pub schedule: Option<String>,
    pub max_attempts: Option<String>,
    pub retry_step_ms: Option<String>,
    pub staging_dir: Option<String>,
    pub storage_endpoint: Option<String>,
    pub storage_region: Option<String>,
    pub pg_dump_path: Option<String>,
}

impl RawEnvConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        RawEnvConfig {
            backup_enabled: get(KEY_ENABLED),
            project_id: get(KEY_PROJECT_ID),
            bucket_name: get(KEY_BUCKET_NAME),
            credentials_path: get(KEY_CREDENTIALS_PATH),
            db_host: get(KEY_DB_HOST),
            db_port: get(KEY_DB_PORT),
            db_user: get(KEY_DB_USER),
            db_password: get(KEY_DB_PASSWORD),
            db_name: get(KEY_DB_NAME),
            retention_days: get(KEY_RETENTION_DAYS),
            schedule: get(KEY_SCHEDULE),
            max_attempts: get(KEY_MAX_ATTEMPTS),
            retry_step_ms: get(KEY_RETRY_STEP_MS),
            staging_dir: get(KEY_STAGING_DIR),
            storage_endpoint: get(KEY_STORAGE_ENDPOINT),
            storage_region: get(KEY_STORAGE_REGION),
            pg_dump_path: get(KEY_PG_DUMP_PATH),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backup_enabled.as_deref().map(str::trim) == Some("true")
    }

    /// Required keys paired with whether each one is set.
    pub fn required_keys(&self) -> [(&'static str, bool); 6] {
        [
            (KEY_PROJECT_ID, self.project_id.is_some()),
            (KEY_BUCKET_NAME, self.bucket_name.is_some()),
            (KEY_CREDENTIALS_PATH, self.credentials_path.is_some()),
            (KEY_DB_HOST, self.db_host.is_some()),
            (KEY_DB_USER, self.db_user.is_some()),
            (KEY_DB_PASSWORD, self.db_password.is_some()),
        ]
    }

    pub fn missing_required(&self) -> Vec<&'static str> {
        self.required_keys()
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(key, _)| key)
            .collect()
    }
}

impl fmt::Debug for RawEnvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawEnvConfig")
            .field("backup_enabled", &self.backup_enabled)
            .field("project_id", &self.project_id)
            .field("bucket_name", &self.bucket_name)
            .field("credentials_path", &self.credentials_path)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_user", &self.db_user)
            .field("db_password", &self.db_password.as_ref().map(|_| "<redacted>"))
            .field("db_name", &self.db_name)
            .field("retention_days", &self.retention_days)
            .field("schedule", &self.schedule)
            .field("max_attempts", &self.max_attempts)
            .field("retry_step_ms", &self.retry_step_ms)
            .field("staging_dir", &self.staging_dir)
            .field("storage_endpoint", &self.storage_endpoint)
            .field("storage_region", &self.storage_region)
            .field("pg_dump_path", &self.pg_dump_path)
            .finish()
    }
}

/// Object storage target. The bucket is addressed through its S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub project_id: String,
    pub bucket_name: String,
    pub credentials_path: PathBuf,
    pub endpoint_url: String,
    pub region: String,
}

impl StorageConfig {
    /// URI scheme used when reporting uploaded objects.
    pub fn scheme(&self) -> &'static str {
        if self.endpoint_url.contains("storage.googleapis.com") {
            "gs"
        } else {
            "s3"
        }
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub retention_days: u32,
    pub staging_dir: PathBuf,
    /// Explicit `pg_dump` binary; looked up on `PATH` when unset.
    pub pg_dump_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` when backups are disabled or required settings are missing.
    pub backup: Option<BackupConfig>,
    pub schedule: String,
    pub max_attempts: u32,
    /// Linear backoff step between attempts.
    pub retry_step: Duration,
    pub raw_env_config: RawEnvConfig,
}

impl AppConfig {
    pub fn load_from_env() -> Result<Self> {
        Self::from_raw(RawEnvConfig::from_env())
    }

    pub fn from_raw(raw_env_config: RawEnvConfig) -> Result<Self> {
        let schedule = raw_env_config
            .schedule
            .clone()
            .unwrap_or_else(|| DEFAULT_SCHEDULE.to_string());
        let max_attempts = parse_positive(
            KEY_MAX_ATTEMPTS,
            raw_env_config.max_attempts.as_deref(),
            DEFAULT_MAX_ATTEMPTS,
        )?;
        let retry_step_ms = parse_positive(
            KEY_RETRY_STEP_MS,
            raw_env_config.retry_step_ms.as_deref(),
            DEFAULT_RETRY_STEP_MS,
        )?;

        let backup = if !raw_env_config.is_enabled() {
            info!(
                "Backup system is disabled ({} is not \"true\", current value: {:?})",
                KEY_ENABLED, raw_env_config.backup_enabled
            );
            None
        } else {
            let missing = raw_env_config.missing_required();
            if missing.is_empty() {
                Some(build_backup_config(&raw_env_config)?)
            } else {
                warn!("Backup system disabled: missing required configuration");
                for key in missing {
                    warn!("  {}: ✗ missing", key);
                }
                None
            }
        };

        if let Some(cfg) = &backup {
            info!("Backup service configured");
            info!("  Project: {}", cfg.storage.project_id);
            info!("  Bucket: {}", cfg.storage.bucket_name);
            info!("  Retention: {} days", cfg.retention_days);
        }

        Ok(AppConfig {
            backup,
            schedule,
            max_attempts,
            retry_step: Duration::from_millis(u64::from(retry_step_ms)),
            raw_env_config,
        })
    }
}

fn build_backup_config(raw: &RawEnvConfig) -> Result<BackupConfig> {
    // Only called once missing_required() came back empty.
    let required = |value: &Option<String>, key: &str| {
        value
            .clone()
            .with_context(|| format!("{} must be set when backups are enabled", key))
    };

    let port = match raw.db_port.as_deref() {
        Some(port) => port
            .trim()
            .parse::<u16>()
            .with_context(|| format!("{} must be a valid port number, got {:?}", KEY_DB_PORT, port))?,
        None => DEFAULT_DB_PORT,
    };
    let retention_days = parse_positive(
        KEY_RETENTION_DAYS,
        raw.retention_days.as_deref(),
        DEFAULT_RETENTION_DAYS,
    )?;

    Ok(BackupConfig {
        storage: StorageConfig {
            project_id: required(&raw.project_id, KEY_PROJECT_ID)?,
            bucket_name: required(&raw.bucket_name, KEY_BUCKET_NAME)?,
            credentials_path: PathBuf::from(required(&raw.credentials_path, KEY_CREDENTIALS_PATH)?),
            endpoint_url: raw
                .storage_endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.to_string()),
            region: raw
                .storage_region
                .clone()
                .unwrap_or_else(|| DEFAULT_STORAGE_REGION.to_string()),
        },
        database: DatabaseConfig {
            host: required(&raw.db_host, KEY_DB_HOST)?,
            port,
            user: required(&raw.db_user, KEY_DB_USER)?,
            password: required(&raw.db_password, KEY_DB_PASSWORD)?,
            name: raw
                .db_name
                .clone()
                .unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
        },
        retention_days,
        staging_dir: raw
            .staging_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir),
        pg_dump_path: raw.pg_dump_path.as_ref().map(PathBuf::from),
    })
}

fn parse_positive(key: &str, value: Option<&str>, default: u32) -> Result<u32> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed = value
        .trim()
        .parse::<u32>()
        .with_context(|| format!("{} must be a positive integer, got {:?}", key, value))?;
    if parsed == 0 {
        anyhow::bail!("{} must be at least 1", key);
    }
    Ok(parsed)
}
