use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

/// Repository for reminders and the delivery queries built on them.
///
/// Implementation notes:
/// - `due_time` and `due_basis_*` are only written by `set_due_time`, which the
///   scheduler calls; inserts leave them NULL so the row is stale until the
///   scheduler has run.
/// - Delivery markers only ever move from NULL to a timestamp here
///   (`... WHERE <marker> IS NULL`), so concurrent markers converge on the
///   first value written.
pub struct ReminderRepository;

impl ReminderRepository {
    pub async fn insert<'e, E>(
        executor: E,
        event_id: i64,
        reminder: &NewReminder,
    ) -> AppResult<Reminder>
    where
        E: sqlx::SqliteExecutor<'e>,
    {
        let now = Utc::now();

        sqlx::query_as::<_, Reminder>(
            r#"
            INSERT INTO reminders (
                event_id, reminder_type, minutes_before, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?)
            RETURNING
                id, event_id, reminder_type, minutes_before,
                due_time, due_basis_start, due_basis_minutes,
                sent_at, email_sent_at, created_at, updated_at
            "#,
        )
        .bind(event_id)
        .bind(reminder.reminder_type)
        .bind(reminder.minutes_before)
        .bind(now)
        .bind(now)
        .fetch_one(executor)
        .await
        .map_err(AppError::Database)
    }

    /// Replace the full reminder set of an event in one transaction.
    pub async fn replace_for_event(
        pool: &SqlitePool,
        event_id: i64,
        reminders: &[NewReminder],
    ) -> AppResult<()> {
        let mut tx = pool.begin().await.map_err(AppError::Database)?;

        sqlx::query("DELETE FROM reminders WHERE event_id = ?")
            .bind(event_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        for reminder in reminders {
            Self::insert(&mut *tx, event_id, reminder).await?;
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn list_for_event(pool: &SqlitePool, event_id: i64) -> AppResult<Vec<Reminder>> {
        sqlx::query_as::<_, Reminder>(
            r#"
            SELECT
                id, event_id, reminder_type, minutes_before,
                due_time, due_basis_start, due_basis_minutes,
                sent_at, email_sent_at, created_at, updated_at
            FROM reminders
            WHERE event_id = ?
            ORDER BY minutes_before DESC, id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> AppResult<Option<Reminder>> {
        sqlx::query_as::<_, Reminder>(
            r#"
            SELECT
                id, event_id, reminder_type, minutes_before,
                due_time, due_basis_start, due_basis_minutes,
                sent_at, email_sent_at, created_at, updated_at
            FROM reminders
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Delete one reminder owned (through its event) by `user_id`.
    pub async fn delete_for_user(pool: &SqlitePool, id: i64, user_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM reminders
            WHERE id = ?
              AND event_id IN (SELECT id FROM events WHERE user_id = ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Reminders of one event whose due time was computed from a different
    /// start time or lead time than the current ones (or never computed).
    pub async fn stale_for_event(
        pool: &SqlitePool,
        event_id: i64,
    ) -> AppResult<Vec<ReminderSchedule>> {
        sqlx::query_as::<_, ReminderSchedule>(
            r#"
            SELECT
                r.id AS reminder_id,
                r.event_id AS event_id,
                r.minutes_before AS minutes_before,
                r.due_time AS due_time,
                e.start_time AS event_start
            FROM reminders r
            LEFT JOIN events e ON e.id = r.event_id
            WHERE r.event_id = ?
              AND (
                    e.id IS NULL
                 OR r.due_basis_start IS NULL
                 OR r.due_basis_minutes IS NULL
                 OR r.due_basis_start != e.start_time
                 OR r.due_basis_minutes != r.minutes_before
              )
            ORDER BY r.id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Stale reminders across all events, oldest rows first.
    pub async fn stale(pool: &SqlitePool, limit: i64) -> AppResult<Vec<ReminderSchedule>> {
        sqlx::query_as::<_, ReminderSchedule>(
            r#"
            SELECT
                r.id AS reminder_id,
                r.event_id AS event_id,
                r.minutes_before AS minutes_before,
                r.due_time AS due_time,
                e.start_time AS event_start
            FROM reminders r
            LEFT JOIN events e ON e.id = r.event_id
            WHERE e.id IS NULL
               OR r.due_basis_start IS NULL
               OR r.due_basis_minutes IS NULL
               OR r.due_basis_start != e.start_time
               OR r.due_basis_minutes != r.minutes_before
            ORDER BY r.id ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Persist a computed due time together with the basis it was computed
    /// from. With `rearm`, both delivery markers are cleared.
    ///
    /// The write only lands while the event start and the lead time still
    /// equal that basis; returns `false` otherwise, or if the row is gone.
    pub async fn set_due_time(
        pool: &SqlitePool,
        id: i64,
        due_time: DateTime<Utc>,
        basis_start: DateTime<Utc>,
        basis_minutes: i64,
        rearm: bool,
    ) -> AppResult<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE reminders
            SET due_time = ?,
                due_basis_start = ?,
                due_basis_minutes = ?,
                sent_at = CASE WHEN ? THEN NULL ELSE sent_at END,
                email_sent_at = CASE WHEN ? THEN NULL ELSE email_sent_at END,
                updated_at = ?
            WHERE id = ?
              AND minutes_before = ?
              AND EXISTS (
                  SELECT 1 FROM events e
                  WHERE e.id = reminders.event_id AND e.start_time = ?
              )
            "#,
        )
        .bind(due_time)
        .bind(basis_start)
        .bind(basis_minutes)
        .bind(rearm)
        .bind(rearm)
        .bind(now)
        .bind(id)
        .bind(basis_minutes)
        .bind(basis_start)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------------

    /// Due reminders of `user_id` not yet delivered through `channel`, for
    /// users that have the channel enabled, earliest due first. Reminders whose
    /// event or user vanished drop out of the inner joins.
    pub async fn find_pending(
        pool: &SqlitePool,
        user_id: &str,
        channel: DeliveryChannel,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<PendingReminder>> {
        let marker = channel.sent_column();
        let enabled = match channel {
            DeliveryChannel::Email => "email_enabled",
            DeliveryChannel::Popup => "popup_enabled",
        };

        let sql = format!(
            r#"
            SELECT
                r.id AS reminder_id,
                r.event_id AS event_id,
                e.title AS title,
                e.start_time AS start_time,
                r.minutes_before AS minutes_before,
                r.reminder_type AS reminder_type,
                r.due_time AS due_time,
                r.{marker} AS sent_at
            FROM reminders r
            INNER JOIN events e ON e.id = r.event_id
            INNER JOIN users u ON u.id = e.user_id
            LEFT JOIN notification_settings s ON s.user_id = u.id
            WHERE e.user_id = ?
              AND r.due_time IS NOT NULL
              AND r.due_time <= ?
              AND r.{marker} IS NULL
              AND r.reminder_type IN (?, 'both')
              AND COALESCE(s.{enabled}, 1) = 1
            ORDER BY r.due_time ASC, r.id ASC
            "#
        );

        sqlx::query_as::<_, PendingReminder>(&sql)
            .bind(user_id)
            .bind(now)
            .bind(channel.as_str())
            .fetch_all(pool)
            .await
            .map_err(AppError::Database)
    }

    /// Record popup delivery. Returns `true` only for the call that set the
    /// marker; repeated calls and unknown or foreign ids return `false`.
    pub async fn mark_sent(
        pool: &SqlitePool,
        user_id: &str,
        id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reminders
            SET sent_at = ?, updated_at = ?
            WHERE id = ?
              AND sent_at IS NULL
              AND event_id IN (SELECT id FROM events WHERE user_id = ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    /// Reminders delivered through the popup channel at or after `since`,
    /// newest first.
    pub async fn find_recent(
        pool: &SqlitePool,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> AppResult<Vec<PendingReminder>> {
        sqlx::query_as::<_, PendingReminder>(
            r#"
            SELECT
                r.id AS reminder_id,
                r.event_id AS event_id,
                e.title AS title,
                e.start_time AS start_time,
                r.minutes_before AS minutes_before,
                r.reminder_type AS reminder_type,
                r.due_time AS due_time,
                r.sent_at AS sent_at
            FROM reminders r
            INNER JOIN events e ON e.id = r.event_id
            INNER JOIN users u ON u.id = e.user_id
            WHERE e.user_id = ?
              AND r.due_time IS NOT NULL
              AND r.sent_at IS NOT NULL
              AND r.sent_at >= ?
            ORDER BY r.sent_at DESC, r.id DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Due email reminders across all users with email delivery enabled.
    pub async fn find_due_email(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<EmailReminder>> {
        sqlx::query_as::<_, EmailReminder>(
            r#"
            SELECT
                r.id AS reminder_id,
                r.event_id AS event_id,
                e.title AS title,
                e.start_time AS start_time,
                r.minutes_before AS minutes_before,
                r.due_time AS due_time,
                u.email AS email,
                u.display_name AS display_name
            FROM reminders r
            INNER JOIN events e ON e.id = r.event_id
            INNER JOIN users u ON u.id = e.user_id
            LEFT JOIN notification_settings s ON s.user_id = u.id
            WHERE r.due_time IS NOT NULL
              AND r.due_time <= ?
              AND r.email_sent_at IS NULL
              AND r.reminder_type IN ('email', 'both')
              AND COALESCE(s.email_enabled, 1) = 1
            ORDER BY r.due_time ASC, r.id ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Claim an email reminder for delivery (compare-and-swap on
    /// `email_sent_at`). Only one caller ever gets `true` for a given reminder.
    pub async fn claim_email(pool: &SqlitePool, id: i64, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE reminders
            SET email_sent_at = ?, updated_at = ?
            WHERE id = ? AND email_sent_at IS NULL
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_event, seed_user, utc};

    #[tokio::test]
    async fn inserted_reminders_are_stale_until_scheduled() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "stale@example.com").await;
        let start = utc(2025, 1, 10, 10, 0);
        let event = seed_event(&pool, &user.id, start).await;
        let reminder = ReminderRepository::insert(
            &pool,
            event.id,
            &NewReminder {
                reminder_type: ReminderType::Popup,
                minutes_before: 15,
            },
        )
        .await
        .unwrap();
        assert!(reminder.due_time.is_none());

        let stale = ReminderRepository::stale_for_event(&pool, event.id)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].event_start, Some(start));

        ReminderRepository::set_due_time(&pool, reminder.id, utc(2025, 1, 10, 9, 45), start, 15, false)
            .await
            .unwrap();
        assert!(ReminderRepository::stale_for_event(&pool, event.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn email_claim_is_compare_and_swap() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "claim@example.com").await;
        let start = utc(2025, 1, 10, 10, 0);
        let event = seed_event(&pool, &user.id, start).await;
        let reminder = ReminderRepository::insert(
            &pool,
            event.id,
            &NewReminder {
                reminder_type: ReminderType::Both,
                minutes_before: 60,
            },
        )
        .await
        .unwrap();
        ReminderRepository::set_due_time(&pool, reminder.id, utc(2025, 1, 10, 9, 0), start, 60, false)
            .await
            .unwrap();

        let now = utc(2025, 1, 10, 9, 1);
        let due = ReminderRepository::find_due_email(&pool, now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].email, "claim@example.com");

        assert!(ReminderRepository::claim_email(&pool, reminder.id, now).await.unwrap());
        assert!(!ReminderRepository::claim_email(&pool, reminder.id, now).await.unwrap());
        assert!(ReminderRepository::find_due_email(&pool, now, 10)
            .await
            .unwrap()
            .is_empty());

        // the popup side of a `both` reminder is unaffected by the email claim
        let popup = ReminderRepository::find_pending(&pool, &user.id, DeliveryChannel::Popup, now)
            .await
            .unwrap();
        assert_eq!(popup.len(), 1);
    }
}
