use std::time::Duration;

use async_trait::async_trait;

use crate::db::PendingReminder;

/// Notification permission as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Never asked, or the prompt was dismissed.
    Default,
    Granted,
    Denied,
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("notifications are not supported")]
    Unsupported,

    #[error("notification permission not granted")]
    NotPermitted,

    #[error("failed to show notification: {0}")]
    Failed(String),
}

/// A native notification for one reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Stable per reminder so a re-shown reminder replaces the previous one.
    pub tag: String,
    pub reminder_id: i64,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn for_reminder(reminder: &PendingReminder) -> Self {
        Self {
            tag: format!("reminder-{}", reminder.reminder_id),
            reminder_id: reminder.reminder_id,
            title: reminder.title.clone(),
            body: format!(
                "Starts {} ({})",
                reminder.lead_description(),
                reminder.start_time.format("%H:%M UTC")
            ),
        }
    }
}

/// The platform's native notification facility.
#[async_trait]
pub trait NotificationBackend: Send + Sync + 'static {
    fn is_supported(&self) -> bool;

    fn permission(&self) -> Permission;

    async fn request_permission(&self) -> Result<Permission, DisplayError>;

    /// Show `notification`, dismissing it after `auto_dismiss`.
    async fn show(
        &self,
        notification: &Notification,
        auto_dismiss: Duration,
    ) -> Result<(), DisplayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    /// A reminder that could not be shown natively.
    Reminder,
    PermissionDenied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub title: String,
    pub message: String,
}

impl Toast {
    pub fn reminder(notification: &Notification) -> Self {
        Self {
            kind: ToastKind::Reminder,
            title: notification.title.clone(),
            message: notification.body.clone(),
        }
    }

    pub fn permission_denied() -> Self {
        Self {
            kind: ToastKind::PermissionDenied,
            title: "Notifications are blocked".to_string(),
            message: "Reminders will not pop up until notifications are allowed again in your system settings.".to_string(),
        }
    }
}

/// In-app message area; always available.
pub trait ToastSink: Send + Sync + 'static {
    fn toast(&self, toast: Toast);
}
