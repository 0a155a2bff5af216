//! Workstream Cockpit database backup tool
//!
//! Dumps the database, gzips it, uploads it to object storage and prunes
//! backups past the retention window. Runs once or on a cron schedule.

// workstream-backup/src/main.rs
mod backup;
mod config;
mod errors;
mod scheduler;
mod storage;
mod telemetry;

use anyhow::{Context, Result};
use config::{AppConfig, KEY_ENABLED};
use std::env;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; the environment may already be populated.
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    match run_app().await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let choice = env::args()
        .nth(1)
        .map(|arg| arg.trim().to_string())
        .unwrap_or_else(|| "backup".to_string());

    let app_config = AppConfig::load_from_env()
        .context("Failed to load backup configuration from environment")?;

    match choice.as_str() {
        "1" | "backup" => {
            info!("=== Manual Backup Started ===");
            log_config_status(&app_config);
            match backup::execute_backup(&app_config, app_config.max_attempts)
                .await
                .context("Backup process failed")?
            {
                Some(report) => info!(
                    "=== Manual Backup Completed Successfully: {} ({} attempt(s), {} old backup(s) deleted) ===",
                    report.remote_path, report.attempts, report.deleted
                ),
                None => info!("=== Manual Backup Skipped: backup system not configured ==="),
            }
        }
        "2" | "schedule" => {
            scheduler::run_scheduler(&app_config)
                .await
                .context("Backup scheduler failed")?;
        }
        "3" | "status" => print_status(&app_config),
        _ => {
            println!("❌ Invalid choice. Use 'backup' (1), 'schedule' (2) or 'status' (3).");
            anyhow::bail!("Invalid operation choice: {}", choice);
        }
    }
    Ok(())
}

fn log_config_status(app_config: &AppConfig) {
    let raw = &app_config.raw_env_config;
    info!("{}: {:?}", KEY_ENABLED, raw.backup_enabled);
    for (key, present) in raw.required_keys() {
        info!("{}: {}", key, if present { "✓ set" } else { "✗ not set" });
    }
}

fn print_status(app_config: &AppConfig) {
    let raw = &app_config.raw_env_config;
    println!(
        "{}: {}",
        KEY_ENABLED,
        if raw.is_enabled() { "✓ true" } else { "✗ not \"true\"" }
    );
    for (key, present) in raw.required_keys() {
        println!("{}: {}", key, if present { "✓ set" } else { "✗ not set" });
    }
    println!("Schedule: {} (UTC)", app_config.schedule);
    println!("Max attempts: {}", app_config.max_attempts);
    println!("Retry step: {}ms", app_config.retry_step.as_millis());
    match &app_config.backup {
        Some(cfg) => {
            println!("Bucket: {}://{}", cfg.storage.scheme(), cfg.storage.bucket_name);
            println!("Retention: {} days", cfg.retention_days);
            println!("Staging directory: {}", cfg.staging_dir.display());
            println!("Backups: enabled");
        }
        None => println!("Backups: disabled"),
    }
}
