// workstream-backup/src/backup/retention.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::storage::ObjectStore;

/// `None` when the window reaches past the earliest representable date.
pub fn cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(retention_days)).and_then(|window| now.checked_sub_signed(window))
}

/// Strictly older than the cutoff; an object exactly on the boundary is kept.
pub fn is_expired(created_at: DateTime<Utc>, cutoff: DateTime<Utc>) -> bool {
    created_at < cutoff
}

/// Deletes every object in the bucket created before `now - retention_days`.
///
/// Objects without a resolvable creation time are left alone. The first
/// failing delete aborts the sweep.
pub async fn sweep_expired(
    store: &dyn ObjectStore,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<usize> {
    let Some(cutoff) = cutoff(now, retention_days) else {
        info!(
            "Retention window of {} days predates any possible backup, nothing to clean up",
            retention_days
        );
        return Ok(0);
    };
    info!(
        "Starting cleanup of backups older than {} ({} days)",
        cutoff.to_rfc3339(),
        retention_days
    );

    let objects = store
        .list()
        .await
        .with_context(|| format!("Failed to list bucket {}", store.bucket()))?;

    let mut deleted = 0;
    for object in objects {
        let Some(created_at) = object.created_at else {
            debug!("Skipping {}: no creation time", object.key);
            continue;
        };
        if !is_expired(created_at, cutoff) {
            continue;
        }
        info!(
            "Deleting old backup: {} (created: {})",
            object.key,
            created_at.to_rfc3339()
        );
        store
            .delete(&object.key)
            .await
            .with_context(|| format!("Failed to delete old backup {}", object.key))?;
        deleted += 1;
    }

    info!("Cleanup completed. Deleted {} old backups.", deleted);
    Ok(deleted)
}
