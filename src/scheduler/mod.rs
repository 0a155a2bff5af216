// workstream-backup/src/scheduler/mod.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{error, info, warn};

use crate::backup::execute_backup;
use crate::config::AppConfig;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Parses a cron expression evaluated in UTC.
///
/// Classic five-field expressions (`min hour dom month dow`) get a leading
/// seconds field of `0` and standard day-of-week numbering (0 or 7 is Sunday,
/// 1 is Monday). Six- and seven-field forms are passed through unchanged.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    normalize(expression.trim())
        .and_then(|normalized| Ok(Schedule::from_str(&normalized)?))
        .with_context(|| format!("Invalid backup schedule expression: {:?}", expression))
}

fn normalize(expression: &str) -> Result<String> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    match fields.as_slice() {
        [minute, hour, day, month, weekday] => Ok(format!(
            "0 {} {} {} {} {}",
            minute,
            hour,
            day,
            month,
            weekday_names(weekday)?
        )),
        _ => Ok(expression.to_string()),
    }
}

/// Rewrites numeric day-of-week items as names. Items without digits (`*`,
/// `?`, `Mon`) are kept as written.
fn weekday_names(field: &str) -> Result<String> {
    let mut items = Vec::new();
    for item in field.split(',') {
        if !item.bytes().any(|b| b.is_ascii_digit()) {
            items.push(item.to_string());
            continue;
        }

        let (base, step) = match item.split_once('/') {
            Some((base, step)) => (base, parse_weekday_number(step, u32::MAX)?),
            None => (item, 1),
        };
        if step == 0 {
            anyhow::bail!("day-of-week step must be at least 1 in {:?}", item);
        }
        let (first, last) = match base.split_once('-') {
            Some((first, last)) => (parse_weekday_number(first, 7)?, parse_weekday_number(last, 7)?),
            None if base == "*" => (0, 6),
            None => {
                let day = parse_weekday_number(base, 7)?;
                (day, if item.contains('/') { 7 } else { day })
            }
        };
        if first > last {
            anyhow::bail!("day-of-week range {:?} runs backwards", item);
        }

        let days: BTreeSet<usize> = (first..=last)
            .step_by(step as usize)
            .map(|day| day as usize % 7)
            .collect();
        items.push(
            days.into_iter()
                .map(|day| WEEKDAYS[day])
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    Ok(items.join(","))
}

fn parse_weekday_number(value: &str, max: u32) -> Result<u32> {
    let number = value
        .parse::<u32>()
        .with_context(|| format!("invalid day-of-week value {:?}", value))?;
    if number > max {
        anyhow::bail!("day-of-week value {} is out of range 0-{}", number, max);
    }
    Ok(number)
}

pub fn next_run_after(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Runs backups on the configured schedule until a shutdown signal arrives.
///
/// Runs are awaited inline, so a slow backup delays the next tick instead of
/// overlapping it. Failed runs are logged and the loop carries on.
pub async fn run_scheduler(app_config: &AppConfig) -> Result<()> {
    if app_config.backup.is_none() {
        info!("Backup system disabled, scheduler not started");
        return Ok(());
    }

    let schedule = parse_schedule(&app_config.schedule)?;
    info!("Backup system enabled. Schedule: {} (UTC)", app_config.schedule);

    loop {
        let Some(next) = next_run_after(&schedule, Utc::now()) else {
            warn!("Schedule {:?} has no upcoming runs, stopping scheduler", app_config.schedule);
            return Ok(());
        };
        info!("Next backup scheduled at {}", next.to_rfc3339());

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown_signal() => {
                info!("Shutdown signal received, stopping backup scheduler");
                return Ok(());
            }
        }

        info!("Scheduled backup triggered");
        if let Err(e) = execute_backup(app_config, app_config.max_attempts).await {
            error!("Scheduled backup failed: {}", e);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SCHEDULE;
    use chrono::TimeZone;

    #[test]
    fn default_schedule_fires_daily_at_two_utc() -> Result<()> {
        let schedule = parse_schedule(DEFAULT_SCHEDULE)?;
        let after = Utc.with_ymd_and_hms(2024, 3, 15, 3, 0, 0).unwrap();

        let mut upcoming = schedule.after(&after);
        assert_eq!(upcoming.next(), Some(Utc.with_ymd_and_hms(2024, 3, 16, 2, 0, 0).unwrap()));
        assert_eq!(upcoming.next(), Some(Utc.with_ymd_and_hms(2024, 3, 17, 2, 0, 0).unwrap()));
        Ok(())
    }

    #[test]
    fn next_run_is_later_the_same_day_when_possible() -> Result<()> {
        let schedule = parse_schedule("0 2 * * *")?;
        let after = Utc.with_ymd_and_hms(2024, 3, 15, 1, 59, 30).unwrap();
        assert_eq!(
            next_run_after(&schedule, after),
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 2, 0, 0).unwrap())
        );
        Ok(())
    }

    #[test]
    fn six_field_expressions_pass_through() -> Result<()> {
        let schedule = parse_schedule("30 15 4 * * *")?;
        let after = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(
            next_run_after(&schedule, after),
            Some(Utc.with_ymd_and_hms(2024, 3, 15, 4, 15, 30).unwrap())
        );
        Ok(())
    }

    fn weekdays_fired(expression: &str) -> Result<Vec<String>> {
        let schedule = parse_schedule(expression)?;
        // Saturday, before the 02:00 run.
        let after = Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap();
        Ok(schedule
            .after(&after)
            .take(7)
            .take_while(|next| *next < after + chrono::Duration::days(7))
            .map(|next| next.format("%a").to_string())
            .collect())
    }

    #[test]
    fn weekday_numbers_follow_standard_cron() -> Result<()> {
        assert_eq!(weekdays_fired("0 2 * * 1-5")?, vec!["Mon", "Tue", "Wed", "Thu", "Fri"]);
        assert_eq!(weekdays_fired("0 2 * * 0")?, vec!["Sun"]);
        assert_eq!(weekdays_fired("0 2 * * 7")?, vec!["Sun"]);
        assert_eq!(weekdays_fired("0 2 * * 1")?, vec!["Mon"]);
        assert_eq!(weekdays_fired("0 2 * * 6,0")?, vec!["Sat", "Sun"]);
        Ok(())
    }

    #[test]
    fn weekday_steps_and_names_are_understood() -> Result<()> {
        assert_eq!(weekdays_fired("0 2 * * */2")?, vec!["Sat", "Sun", "Tue", "Thu"]);
        assert_eq!(weekdays_fired("0 2 * * 1-5/2")?, vec!["Mon", "Wed", "Fri"]);
        assert_eq!(weekdays_fired("0 2 * * 5-7")?, vec!["Sat", "Sun", "Fri"]);
        assert_eq!(weekdays_fired("0 2 * * Mon,Wed,Fri")?, vec!["Mon", "Wed", "Fri"]);
        Ok(())
    }

    #[test]
    fn out_of_range_weekdays_are_rejected() {
        for expression in ["0 2 * * 8", "0 2 * * 5-1", "0 2 * * */0"] {
            let err = parse_schedule(expression).unwrap_err();
            assert!(err.to_string().contains("Invalid backup schedule expression"), "{}", expression);
        }
    }

    #[test]
    fn garbage_is_rejected() {
        let err = parse_schedule("every night").unwrap_err();
        assert!(err.to_string().contains("Invalid backup schedule expression"));
    }

    #[tokio::test]
    async fn disabled_config_returns_immediately() -> Result<()> {
        let config = AppConfig::from_raw(Default::default())?;
        run_scheduler(&config).await
    }
}
