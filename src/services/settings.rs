use sqlx::SqlitePool;

use crate::db::{
    NotificationSettings, NotificationSettingsRepository, UpdateNotificationSettings,
    ALLOWED_DEFAULT_REMINDER_MINUTES,
};
use crate::error::{AppError, AppResult};

pub struct SettingsService;

impl SettingsService {
    /// Validate a settings update
    pub fn validate_update(update: &UpdateNotificationSettings) -> AppResult<()> {
        if let Some(minutes) = update.default_reminder_minutes {
            if !ALLOWED_DEFAULT_REMINDER_MINUTES.contains(&minutes) {
                return Err(AppError::Validation(format!(
                    "default_reminder_minutes must be one of {:?}",
                    ALLOWED_DEFAULT_REMINDER_MINUTES
                )));
            }
        }
        Ok(())
    }

    /// Get notification settings
    pub async fn get_settings(pool: &SqlitePool, user_id: &str) -> AppResult<NotificationSettings> {
        NotificationSettingsRepository::get_or_create(pool, user_id).await
    }

    /// Update notification settings
    pub async fn update_settings(
        pool: &SqlitePool,
        user_id: &str,
        update: UpdateNotificationSettings,
    ) -> AppResult<NotificationSettings> {
        Self::validate_update(&update)?;
        let settings = NotificationSettingsRepository::update(pool, user_id, update).await?;
        tracing::debug!(
            user_id,
            email_enabled = settings.email_enabled,
            popup_enabled = settings.popup_enabled,
            "Updated notification settings"
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reminder_minutes_must_be_a_preset() {
        for minutes in ALLOWED_DEFAULT_REMINDER_MINUTES {
            let update = UpdateNotificationSettings {
                default_reminder_minutes: Some(minutes),
                ..Default::default()
            };
            assert!(SettingsService::validate_update(&update).is_ok());
        }

        let update = UpdateNotificationSettings {
            default_reminder_minutes: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            SettingsService::validate_update(&update),
            Err(AppError::Validation(_))
        ));
    }
}
