//! Initialization helpers for the application:
//! - database connection + migrations
//! - background worker spawn helpers

use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::Utc;

use crate::config::Config;
use crate::services::notifications::{EmailReminderService, WebhookMailer};
use crate::services::scheduler::ReminderScheduler;
use crate::AppState;

/// Redact potentially sensitive information from a database URL before logging.
///
/// Attempts to parse the URL and remove userinfo (username:password) components.
/// Falls back to removing everything before '@' or returning "(redacted)".
pub fn redact_db_url(db_url: &str) -> String {
    if let Ok(url) = url::Url::parse(db_url) {
        let scheme = url.scheme();
        let host = url.host_str().unwrap_or("");
        let port_part = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
        let path = url.path();
        format!("{}://{}{}{}", scheme, host, port_part, path)
    } else {
        if let Some(at_pos) = db_url.find('@') {
            let without_creds = &db_url[at_pos + 1..];
            return format!("(redacted){}", without_creds);
        }
        "(redacted)".to_string()
    }
}

/// Initialize SQLite database connection and run migrations.
///
/// Creates the parent directory for the database file (if applicable) and
/// enables foreign keys so deleting an event removes its reminders.
pub async fn init_db(config: &Config) -> Result<sqlx::SqlitePool> {
    let db_url = &config.database.url;
    tracing::info!("Connecting to database: {}", redact_db_url(db_url));

    let db_path = db_url.strip_prefix("sqlite://").unwrap_or(db_url);
    let db_file_path = Path::new(db_path);

    if let Some(parent) = db_file_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                )
            })?;
        }
    }

    let connect_options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect_with(connect_options)
        .await?;

    tracing::info!("Running database migrations");
    crate::db::MIGRATOR.run(&pool).await?;

    Ok(pool)
}

/// Spawn background workers:
/// - periodic sweep recomputing stale reminder due times
/// - email reminder delivery (only when a mail webhook is configured)
///
/// Each worker listens for a shutdown notification via the broadcast sender;
/// the returned handles let the caller await their exit.
pub fn spawn_background_workers(
    state: Arc<AppState>,
    shutdown: tokio::sync::broadcast::Sender<()>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let mut handles = Vec::new();

    // Stale due-time sweep
    {
        let mut shutdown_rx = shutdown.subscribe();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let interval = Duration::from_secs(state.config.reminders.sweep_interval_seconds);
            loop {
                match ReminderScheduler::recompute_stale(
                    &state.db,
                    state.config.reminders.sweep_batch_size,
                    Utc::now(),
                )
                .await
                {
                    Ok(summary) if summary.updated > 0 || summary.skipped > 0 => {
                        tracing::info!(
                            updated = summary.updated,
                            skipped = summary.skipped,
                            "Reminder sweep recomputed stale due times"
                        );
                    }
                    Ok(_) => tracing::debug!("Reminder sweep found nothing stale"),
                    Err(e) => tracing::warn!("Reminder sweep failed: {:?}", e),
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Reminder sweep worker shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }));
    }

    // Email delivery worker
    match state.config.mail.webhook_url.as_deref().map(WebhookMailer::new) {
        None => tracing::info!("MAIL_WEBHOOK_URL not set; email reminders are disabled"),
        Some(Err(e)) => tracing::warn!("Failed to build mail client: {:?}", e),
        Some(Ok(mailer)) => {
            let mut shutdown_rx = shutdown.subscribe();
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                let interval = Duration::from_secs(state.config.mail.poll_interval_seconds);
                loop {
                    match EmailReminderService::deliver_due(
                        &state.db,
                        &mailer,
                        Utc::now(),
                        state.config.mail.batch_size,
                    )
                    .await
                    {
                        Ok(report) if report.sent > 0 || report.failed > 0 => {
                            tracing::info!(
                                sent = report.sent,
                                failed = report.failed,
                                "Email reminder pass finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Email reminder pass failed: {:?}", e),
                    }

                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            tracing::info!("Email reminder worker shutting down");
                            break;
                        }
                        _ = tokio::time::sleep(interval) => {}
                    }
                }
            }));
        }
    }

    handles
}
