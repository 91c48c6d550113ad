use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Notification Settings Repository
// ============================================================================

pub struct NotificationSettingsRepository;

impl NotificationSettingsRepository {
    pub async fn find_by_user_id(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<Option<NotificationSettings>> {
        sqlx::query_as::<_, NotificationSettings>(
            r#"
            SELECT user_id, email_enabled, popup_enabled, default_reminder_minutes,
                   created_at, updated_at
            FROM notification_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Return the user's settings, inserting the defaults (both channels on,
    /// 15 minute lead) on first access.
    pub async fn get_or_create(
        pool: &SqlitePool,
        user_id: &str,
    ) -> AppResult<NotificationSettings> {
        if let Some(settings) = Self::find_by_user_id(pool, user_id).await? {
            return Ok(settings);
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO notification_settings (
                user_id, email_enabled, popup_enabled, default_reminder_minutes,
                created_at, updated_at
            )
            VALUES (?, 1, 1, 15, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .map_err(AppError::Database)?;

        Self::find_by_user_id(pool, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification settings not found".to_string()))
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        update: UpdateNotificationSettings,
    ) -> AppResult<NotificationSettings> {
        let current = Self::get_or_create(pool, user_id).await?;

        let email_enabled = update.email_enabled.unwrap_or(current.email_enabled);
        let popup_enabled = update.popup_enabled.unwrap_or(current.popup_enabled);
        let default_reminder_minutes = update
            .default_reminder_minutes
            .unwrap_or(current.default_reminder_minutes);

        let now = Utc::now();
        sqlx::query_as::<_, NotificationSettings>(
            r#"
            UPDATE notification_settings
            SET email_enabled = ?,
                popup_enabled = ?,
                default_reminder_minutes = ?,
                updated_at = ?
            WHERE user_id = ?
            RETURNING user_id, email_enabled, popup_enabled, default_reminder_minutes,
                      created_at, updated_at
            "#,
        )
        .bind(email_enabled)
        .bind(popup_enabled)
        .bind(default_reminder_minutes)
        .bind(now)
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }
}
