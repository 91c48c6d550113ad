//! Time-lence reminder scheduling and delivery.
//!
//! The server keeps reminder due times consistent with their events
//! ([`services::scheduler`]), serves due reminders to polling clients
//! ([`services::delivery`]) and pushes email reminders through a mail
//! webhook ([`services::notifications`]). [`agent`] is the client side that
//! polls and displays popup reminders.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;

use config::Config;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
}

/// In-memory state for handler and service tests.
#[cfg(test)]
pub(crate) async fn test_state() -> std::sync::Arc<AppState> {
    let mut config = Config::default();
    config.jwt.secret = "test-secret-do-not-use".to_string();
    std::sync::Arc::new(AppState {
        db: db::test_support::memory_pool().await,
        config,
    })
}
