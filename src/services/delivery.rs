//! Pull-model reminder delivery: clients ask for what is due, then report
//! back what they displayed.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::db::{DeliveryChannel, EmailReminder, PendingReminder, ReminderRepository};
use crate::error::AppResult;

pub struct ReminderDeliveryPoller;

impl ReminderDeliveryPoller {
    /// Due, undelivered reminders of `user_id` for `channel`, earliest due
    /// first. Reminders whose event or owner disappeared are simply absent.
    pub async fn get_pending(
        pool: &SqlitePool,
        user_id: &str,
        channel: DeliveryChannel,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingReminder>> {
        let pending = ReminderRepository::find_pending(pool, user_id, channel, now).await?;
        if !pending.is_empty() {
            tracing::debug!(
                user_id,
                channel = channel.as_str(),
                count = pending.len(),
                "Returning pending reminders"
            );
        }
        Ok(pending)
    }

    /// Record popup delivery of a reminder. Idempotent: repeat calls, and calls
    /// for reminders that vanished or belong to someone else, succeed without
    /// changing anything.
    pub async fn mark_sent(
        pool: &SqlitePool,
        user_id: &str,
        reminder_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let newly_marked = ReminderRepository::mark_sent(pool, user_id, reminder_id, now).await?;
        if newly_marked {
            tracing::debug!(user_id, reminder_id, "Reminder marked as sent");
        } else {
            tracing::debug!(
                user_id,
                reminder_id,
                "Mark-sent was a no-op (already sent or not found)"
            );
        }
        Ok(())
    }

    /// Reminders delivered within the last `window`, newest first.
    pub async fn get_recent(
        pool: &SqlitePool,
        user_id: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> AppResult<Vec<PendingReminder>> {
        ReminderRepository::find_recent(pool, user_id, now - window).await
    }

    /// Claim up to `limit` due email reminders. Each row is claimed with its
    /// own compare-and-swap; rows another worker claimed first are left out.
    pub async fn claim_due_email(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<EmailReminder>> {
        let due = ReminderRepository::find_due_email(pool, now, limit).await?;
        let mut claimed = Vec::with_capacity(due.len());
        for reminder in due {
            if ReminderRepository::claim_email(pool, reminder.reminder_id, now).await? {
                claimed.push(reminder);
            } else {
                tracing::debug!(
                    reminder_id = reminder.reminder_id,
                    "Email reminder already claimed"
                );
            }
        }
        Ok(claimed)
    }
}
