//! Email reminder delivery.
//!
//! Email reminders are pushed by the server (popup reminders are pulled by
//! clients). Each due reminder is claimed with a compare-and-swap on
//! `email_sent_at` before it is handed to the mailer, so a reminder is emailed
//! at most once even if several workers run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{describe_lead, EmailReminder};
use crate::error::{AppError, AppResult};
use crate::services::delivery::ReminderDeliveryPoller;

/// Rendered reminder email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReminderEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub reminder_id: i64,
    pub event_id: i64,
}

impl ReminderEmail {
    pub fn render(reminder: &EmailReminder) -> Self {
        let lead = describe_lead(reminder.minutes_before);
        let starts = reminder.start_time.format("%Y-%m-%d %H:%M UTC");
        Self {
            to: reminder.email.clone(),
            subject: format!("Reminder: {} starts {}", reminder.title, lead),
            text: format!(
                "Hi {},\n\n\"{}\" starts {} ({}).\n\n-- Time-lence",
                reminder.display_name, reminder.title, lead, starts
            ),
            reminder_id: reminder.reminder_id,
            event_id: reminder.event_id,
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: &ReminderEmail) -> AppResult<()>;
}

/// Mailer that POSTs each email as JSON to an outbound mail webhook.
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, email: &ReminderEmail) -> AppResult<()> {
        let resp = self.client.post(&self.url).json(email).send().await?;
        if !resp.status().is_success() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "mail webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Result of one delivery pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct EmailReminderService;

impl EmailReminderService {
    /// Claim and send up to `limit` due email reminders.
    ///
    /// A failed send is logged and not retried: the claim stays in place.
    pub async fn deliver_due(
        pool: &SqlitePool,
        mailer: &dyn Mailer,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<DeliveryReport> {
        let claimed = ReminderDeliveryPoller::claim_due_email(pool, now, limit).await?;
        let mut report = DeliveryReport::default();

        for reminder in claimed {
            let email = ReminderEmail::render(&reminder);
            match mailer.send(&email).await {
                Ok(()) => {
                    tracing::info!(
                        reminder_id = reminder.reminder_id,
                        event_id = reminder.event_id,
                        "Sent reminder email"
                    );
                    report.sent += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        reminder_id = reminder.reminder_id,
                        "Failed to send reminder email: {:?}",
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
