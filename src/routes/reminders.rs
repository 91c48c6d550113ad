use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{Duration, Utc};

use crate::db::PendingReminder;
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::{ok, ApiResponse};
use crate::services::delivery::ReminderDeliveryPoller;
use crate::services::events::EventService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recent", get(recent_reminders))
        .route("/:id", delete(delete_reminder))
}

/// Reminders delivered within the configured recent window, newest first.
async fn recent_reminders(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApiResponse<Vec<PendingReminder>>>> {
    let window = Duration::hours(state.config.reminders.recent_window_hours);
    let recent = ReminderDeliveryPoller::get_recent(&state.db, &user.id, Utc::now(), window).await?;
    Ok(ok(recent))
}

async fn delete_reminder(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    EventService::delete_reminder(&state.db, &user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
