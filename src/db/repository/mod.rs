pub mod event;
pub mod notification_settings;
pub mod reminder;
pub mod user;

pub use event::EventRepository;
pub use notification_settings::NotificationSettingsRepository;
pub use reminder::ReminderRepository;
pub use user::UserRepository;
