pub mod auth;
pub mod delivery;
pub mod events;
pub mod init;
pub mod notifications;
pub mod scheduler;
pub mod settings;
