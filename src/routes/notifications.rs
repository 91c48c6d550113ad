use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{DeliveryChannel, NotificationSettings, PendingReminder, UpdateNotificationSettings};
use crate::error::{AppError, AppResult};
use crate::routes::auth::AuthUser;
use crate::routes::{ok, ApiResponse};
use crate::services::delivery::ReminderDeliveryPoller;
use crate::services::settings::SettingsService;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pending", get(pending_notifications))
        .route("/:id/mark-sent", post(mark_sent))
        .route("/settings", get(get_settings).put(update_settings))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    /// Delivery channel; defaults to `popup`.
    #[serde(rename = "type")]
    pub channel: Option<String>,
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn pending_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<PendingQuery>,
) -> AppResult<Json<ApiResponse<Vec<PendingReminder>>>> {
    let channel = match query.channel.as_deref() {
        None => DeliveryChannel::Popup,
        Some(raw) => raw.parse::<DeliveryChannel>().map_err(AppError::Validation)?,
    };

    let pending =
        ReminderDeliveryPoller::get_pending(&state.db, &user.id, channel, Utc::now()).await?;
    Ok(ok(pending))
}

/// Always answers `{"success": true}` unless storage fails, so a client can
/// retry freely.
async fn mark_sent(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    ReminderDeliveryPoller::mark_sent(&state.db, &user.id, id, Utc::now()).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn get_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
) -> AppResult<Json<ApiResponse<NotificationSettings>>> {
    Ok(ok(SettingsService::get_settings(&state.db, &user.id).await?))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(update): Json<UpdateNotificationSettings>,
) -> AppResult<Json<ApiResponse<NotificationSettings>>> {
    Ok(ok(
        SettingsService::update_settings(&state.db, &user.id, update).await?
    ))
}
