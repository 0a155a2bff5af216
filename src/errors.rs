use thiserror::Error;

use crate::backup::Stage;

/// Failure of one backup attempt (or of configuration loading).
///
/// Every stage variant wraps the `anyhow` chain produced by the step, so the
/// rendered message names the stage first and the underlying cause after it.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database dump failed: {0:#}")]
    Dump(anyhow::Error),

    #[error("Compression failed: {0:#}")]
    Compress(anyhow::Error),

    #[error("Upload failed: {0:#}")]
    Upload(anyhow::Error),

    #[error("Retention sweep failed: {0:#}")]
    Retention(anyhow::Error),
}

impl BackupError {
    /// Wraps a step error into the variant for the stage it came from.
    pub fn at(stage: Stage, err: anyhow::Error) -> Self {
        match stage {
            Stage::Dumping => Self::Dump(err),
            Stage::Compressing => Self::Compress(err),
            Stage::Uploading => Self::Upload(err),
            Stage::Sweeping => Self::Retention(err),
        }
    }

    /// The cycle stage that failed, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Config(_) => None,
            Self::Dump(_) => Some(Stage::Dumping),
            Self::Compress(_) => Some(Stage::Compressing),
            Self::Upload(_) => Some(Stage::Uploading),
            Self::Retention(_) => Some(Stage::Sweeping),
        }
    }

    /// Whether re-running the whole cycle could succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
