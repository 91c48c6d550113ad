//! Event and reminder-set mutations. Every mutation that can change a start
//! time or a reminder set runs the scheduler before returning, so callers
//! never read a stale due time.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::db::{
    CreateEvent, Event, EventRepository, NewReminder, NotificationSettingsRepository, Reminder,
    ReminderRepository, ReminderType, UpdateEvent, MAX_MINUTES_BEFORE,
};
use crate::error::{AppError, AppResult};
use crate::services::scheduler::ReminderScheduler;

const MAX_TITLE_LEN: usize = 255;
const MAX_REMINDERS_PER_EVENT: usize = 10;

#[derive(Debug, Serialize)]
pub struct EventWithReminders {
    #[serde(flatten)]
    pub event: Event,
    pub reminders: Vec<Reminder>,
}

pub struct EventService;

impl EventService {
    pub fn validate_title(title: &str) -> AppResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("title cannot be empty".to_string()));
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "title cannot exceed {} characters",
                MAX_TITLE_LEN
            )));
        }
        Ok(())
    }

    pub fn validate_reminders(reminders: &[NewReminder]) -> AppResult<()> {
        if reminders.len() > MAX_REMINDERS_PER_EVENT {
            return Err(AppError::Validation(format!(
                "an event can have at most {} reminders",
                MAX_REMINDERS_PER_EVENT
            )));
        }
        for reminder in reminders {
            if !(0..=MAX_MINUTES_BEFORE).contains(&reminder.minutes_before) {
                return Err(AppError::Validation(format!(
                    "minutes_before must be between 0 and {}",
                    MAX_MINUTES_BEFORE
                )));
            }
        }
        Ok(())
    }

    fn validate_window(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> AppResult<()> {
        if end_time < start_time {
            return Err(AppError::Validation(
                "end_time must not be before start_time".to_string(),
            ));
        }
        Ok(())
    }

    async fn with_reminders(pool: &SqlitePool, event: Event) -> AppResult<EventWithReminders> {
        let reminders = ReminderRepository::list_for_event(pool, event.id).await?;
        Ok(EventWithReminders { event, reminders })
    }

    /// Create an event. Without an explicit reminder list, the user's default
    /// lead time is used for a single popup reminder.
    pub async fn create(
        pool: &SqlitePool,
        user_id: &str,
        event: CreateEvent,
        reminders: Option<Vec<NewReminder>>,
    ) -> AppResult<EventWithReminders> {
        Self::validate_title(&event.title)?;
        Self::validate_window(event.start_time, event.end_time)?;
        if let Some(ref reminders) = reminders {
            Self::validate_reminders(reminders)?;
        }

        let reminders = match reminders {
            Some(reminders) => reminders,
            None => {
                let settings = NotificationSettingsRepository::get_or_create(pool, user_id).await?;
                vec![NewReminder {
                    reminder_type: ReminderType::Popup,
                    minutes_before: settings.default_reminder_minutes,
                }]
            }
        };

        let event = EventRepository::create(
            pool,
            user_id,
            CreateEvent {
                title: event.title.trim().to_string(),
                ..event
            },
        )
        .await?;
        ReminderRepository::replace_for_event(pool, event.id, &reminders).await?;
        ReminderScheduler::recompute_due_times(pool, event.id, Utc::now()).await?;

        tracing::info!("Created event {} for user {}", event.id, user_id);
        Self::with_reminders(pool, event).await
    }

    pub async fn get(pool: &SqlitePool, user_id: &str, id: i64) -> AppResult<EventWithReminders> {
        let event = EventRepository::find_for_user(pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        Self::with_reminders(pool, event).await
    }

    /// Update an event and optionally replace its reminder set.
    pub async fn update(
        pool: &SqlitePool,
        user_id: &str,
        id: i64,
        update: UpdateEvent,
        reminders: Option<Vec<NewReminder>>,
    ) -> AppResult<EventWithReminders> {
        let current = EventRepository::find_for_user(pool, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        if let Some(ref title) = update.title {
            Self::validate_title(title)?;
        }
        Self::validate_window(
            update.start_time.unwrap_or(current.start_time),
            update.end_time.unwrap_or(current.end_time),
        )?;
        if let Some(ref reminders) = reminders {
            Self::validate_reminders(reminders)?;
        }

        let update = UpdateEvent {
            title: update.title.map(|t| t.trim().to_string()),
            ..update
        };
        let event = EventRepository::update(pool, id, user_id, update)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        if let Some(reminders) = reminders {
            ReminderRepository::replace_for_event(pool, event.id, &reminders).await?;
        }
        ReminderScheduler::recompute_due_times(pool, event.id, Utc::now()).await?;

        Self::with_reminders(pool, event).await
    }

    /// Replace an event's reminder set.
    pub async fn replace_reminders(
        pool: &SqlitePool,
        user_id: &str,
        event_id: i64,
        reminders: Vec<NewReminder>,
    ) -> AppResult<Vec<Reminder>> {
        Self::validate_reminders(&reminders)?;
        EventRepository::find_for_user(pool, event_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;

        ReminderRepository::replace_for_event(pool, event_id, &reminders).await?;
        ReminderScheduler::recompute_due_times(pool, event_id, Utc::now()).await?;

        ReminderRepository::list_for_event(pool, event_id).await
    }

    pub async fn list_reminders(
        pool: &SqlitePool,
        user_id: &str,
        event_id: i64,
    ) -> AppResult<Vec<Reminder>> {
        EventRepository::find_for_user(pool, event_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        ReminderRepository::list_for_event(pool, event_id).await
    }

    pub async fn delete(pool: &SqlitePool, user_id: &str, id: i64) -> AppResult<()> {
        if !EventRepository::delete(pool, id, user_id).await? {
            return Err(AppError::NotFound("Event not found".to_string()));
        }
        tracing::info!("Deleted event {} for user {}", id, user_id);
        Ok(())
    }

    pub async fn delete_reminder(pool: &SqlitePool, user_id: &str, id: i64) -> AppResult<()> {
        if !ReminderRepository::delete_for_user(pool, id, user_id).await? {
            return Err(AppError::NotFound("Reminder not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{memory_pool, seed_user, utc};
    use crate::db::UpdateNotificationSettings;

    fn new_event(title: &str) -> CreateEvent {
        CreateEvent {
            title: title.to_string(),
            description: None,
            location: None,
            category: Some("work".to_string()),
            start_time: utc(2030, 1, 10, 10, 0),
            end_time: utc(2030, 1, 10, 11, 0),
            is_all_day: false,
            is_recurring: false,
        }
    }

    #[tokio::test]
    async fn create_uses_default_lead_time_and_computes_due_time() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "create@example.com").await;
        NotificationSettingsRepository::update(
            &pool,
            &user.id,
            UpdateNotificationSettings {
                default_reminder_minutes: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let created = EventService::create(&pool, &user.id, new_event("  Review  "), None)
            .await
            .unwrap();

        assert_eq!(created.event.title, "Review");
        assert_eq!(created.reminders.len(), 1);
        assert_eq!(created.reminders[0].reminder_type, ReminderType::Popup);
        assert_eq!(created.reminders[0].minutes_before, 30);
        assert_eq!(created.reminders[0].due_time, Some(utc(2030, 1, 10, 9, 30)));
    }

    #[tokio::test]
    async fn update_response_carries_recomputed_due_times() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "update@example.com").await;
        let created = EventService::create(
            &pool,
            &user.id,
            new_event("Planning"),
            Some(vec![NewReminder {
                reminder_type: ReminderType::Both,
                minutes_before: 60,
            }]),
        )
        .await
        .unwrap();

        let updated = EventService::update(
            &pool,
            &user.id,
            created.event.id,
            UpdateEvent {
                start_time: Some(utc(2030, 1, 11, 8, 0)),
                end_time: Some(utc(2030, 1, 11, 9, 0)),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
        assert_eq!(updated.reminders[0].due_time, Some(utc(2030, 1, 11, 7, 0)));

        let replaced = EventService::replace_reminders(
            &pool,
            &user.id,
            created.event.id,
            vec![NewReminder {
                reminder_type: ReminderType::Popup,
                minutes_before: 5,
            }],
        )
        .await
        .unwrap();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].due_time, Some(utc(2030, 1, 11, 7, 55)));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_scheduling() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "invalid@example.com").await;

        let too_long_lead = EventService::create(
            &pool,
            &user.id,
            new_event("Trip"),
            Some(vec![NewReminder {
                reminder_type: ReminderType::Email,
                minutes_before: MAX_MINUTES_BEFORE + 1,
            }]),
        )
        .await;
        assert!(matches!(too_long_lead, Err(AppError::Validation(_))));

        let mut backwards = new_event("Backwards");
        backwards.end_time = utc(2030, 1, 10, 9, 0);
        let result = EventService::create(&pool, &user.id, backwards, None).await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let blank = EventService::create(&pool, &user.id, new_event("   "), None).await;
        assert!(matches!(blank, Err(AppError::Validation(_))));

        let events = EventRepository::list_for_user(&pool, &user.id, None, None)
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn other_users_cannot_touch_an_event() {
        let pool = memory_pool().await;
        let owner = seed_user(&pool, "mine@example.com").await;
        let other = seed_user(&pool, "yours@example.com").await;
        let created = EventService::create(&pool, &owner.id, new_event("Private"), None)
            .await
            .unwrap();

        assert!(matches!(
            EventService::get(&pool, &other.id, created.event.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            EventService::delete(&pool, &other.id, created.event.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            EventService::delete_reminder(&pool, &other.id, created.reminders[0].id).await,
            Err(AppError::NotFound(_))
        ));

        EventService::delete(&pool, &owner.id, created.event.id)
            .await
            .unwrap();
        assert!(ReminderRepository::find_by_id(&pool, created.reminders[0].id)
            .await
            .unwrap()
            .is_none());
    }
}
