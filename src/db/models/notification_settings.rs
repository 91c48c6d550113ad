use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lead times a user may pick as their default reminder.
pub const ALLOWED_DEFAULT_REMINDER_MINUTES: [i64; 4] = [5, 15, 30, 60];

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub user_id: String,
    pub email_enabled: bool,
    pub popup_enabled: bool,
    pub default_reminder_minutes: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateNotificationSettings {
    pub email_enabled: Option<bool>,
    pub popup_enabled: Option<bool>,
    pub default_reminder_minutes: Option<i64>,
}
