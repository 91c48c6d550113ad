use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

pub mod auth;
pub mod events;
pub mod health;
pub mod notifications;
pub mod reminders;

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Authenticated API routes. Auth routes are nested separately so the
/// caller can put a rate limiter in front of them.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/events", events::router())
        .nest("/api/reminders", reminders::router())
        .nest("/api/notifications", notifications::router())
}
