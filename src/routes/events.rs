use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::{CreateEvent, Event, EventRepository, NewReminder, Reminder, UpdateEvent};
use crate::error::AppResult;
use crate::routes::auth::AuthUser;
use crate::routes::{ok, ApiResponse};
use crate::services::events::{EventService, EventWithReminders};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route(
            "/:id",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/:id/reminders", get(list_reminders).put(replace_reminders))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(flatten)]
    pub event: CreateEvent,
    /// Omitted: one popup reminder at the user's default lead time.
    pub reminders: Option<Vec<NewReminder>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    #[serde(flatten)]
    pub event: UpdateEvent,
    /// Omitted: the reminder set is left as is.
    pub reminders: Option<Vec<NewReminder>>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceRemindersRequest {
    pub reminders: Vec<NewReminder>,
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn list_events(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListEventsQuery>,
) -> AppResult<Json<ApiResponse<Vec<Event>>>> {
    let events = EventRepository::list_for_user(&state.db, &user.id, query.from, query.to).await?;
    Ok(ok(events))
}

async fn create_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<EventWithReminders>>)> {
    let created =
        EventService::create(&state.db, &user.id, request.event, request.reminders).await?;
    Ok((StatusCode::CREATED, ok(created)))
}

async fn get_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<EventWithReminders>>> {
    Ok(ok(EventService::get(&state.db, &user.id, id).await?))
}

async fn update_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateEventRequest>,
) -> AppResult<Json<ApiResponse<EventWithReminders>>> {
    let updated =
        EventService::update(&state.db, &user.id, id, request.event, request.reminders).await?;
    Ok(ok(updated))
}

async fn delete_event(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    EventService::delete(&state.db, &user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_reminders(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<Reminder>>>> {
    Ok(ok(EventService::list_reminders(&state.db, &user.id, id).await?))
}

async fn replace_reminders(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<ReplaceRemindersRequest>,
) -> AppResult<Json<ApiResponse<Vec<Reminder>>>> {
    let reminders =
        EventService::replace_reminders(&state.db, &user.id, id, request.reminders).await?;
    Ok(ok(reminders))
}
