//! Background maintenance task.
//!
//! Periodically enforces retention on the append-only log tables and flags
//! IPs with an anomalous number of failed logins. Runs until the
//! cancellation token fires.

use crate::config::MaintenanceConfig;
use crate::db::handlers::{AuditLog, LoginAttempts};
use crate::db::models::audit::AuditEntryDBRequest;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub fn spawn(pool: PgPool, config: MaintenanceConfig, token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run(pool, config, token))
}

async fn run(pool: PgPool, config: MaintenanceConfig, token: CancellationToken) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(interval = ?config.interval, "maintenance task started");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                info!("maintenance task stopping");
                return;
            }
            _ = interval.tick() => {
                if let Err(e) = sweep(&pool, &config).await {
                    warn!(error = %e, "maintenance sweep failed");
                }
            }
        }
    }
}

/// One maintenance pass: retention sweeps, then suspicious login detection.
#[instrument(skip_all, err)]
pub async fn sweep(pool: &PgPool, config: &MaintenanceConfig) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;

    let audit_cutoff = Utc::now() - Duration::from_std(config.audit_retention)?;
    let removed = AuditLog::new(&mut conn).delete_older_than(audit_cutoff).await?;
    if removed > 0 {
        debug!(removed, "expired audit log rows removed");
    }

    let attempt_cutoff = Utc::now() - Duration::from_std(config.login_attempt_retention)?;
    let removed = LoginAttempts::new(&mut conn).delete_older_than(attempt_cutoff).await?;
    if removed > 0 {
        debug!(removed, "expired login attempt rows removed");
    }

    let since = Utc::now() - Duration::from_std(config.suspicious_window)?;
    let sources = LoginAttempts::new(&mut conn)
        .suspicious_sources(since, config.suspicious_threshold)
        .await?;

    for source in sources {
        warn!(
            ip = %source.ip_address,
            failures = source.failures,
            window = ?config.suspicious_window,
            "suspicious login activity detected"
        );
        let entry = AuditEntryDBRequest::new(
            "login",
            &source.ip_address,
            "login.suspicious_activity",
            format!("{} failed login attempts from {}", source.failures, source.ip_address),
        )
        .metadata(serde_json::json!({
            "failures": source.failures,
            "window_secs": config.suspicious_window.as_secs(),
        }));
        AuditLog::new(&mut conn).append(&entry).await?;
    }

    Ok(())
}
