use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Event Repository
// ============================================================================

/// Every query is scoped by the owning user id.
pub struct EventRepository;

impl EventRepository {
    pub async fn create(pool: &SqlitePool, user_id: &str, event: CreateEvent) -> AppResult<Event> {
        let now = Utc::now();

        sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (
                user_id, title, description, location, category,
                start_time, end_time, is_all_day, is_recurring,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING
                id, user_id, title, description, location, category,
                start_time, end_time, is_all_day, is_recurring,
                created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(event.title)
        .bind(event.description)
        .bind(event.location)
        .bind(event.category)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.is_all_day)
        .bind(event.is_recurring)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(AppError::Database)
    }

    pub async fn find_for_user(
        pool: &SqlitePool,
        id: i64,
        user_id: &str,
    ) -> AppResult<Option<Event>> {
        sqlx::query_as::<_, Event>(
            r#"
            SELECT
                id, user_id, title, description, location, category,
                start_time, end_time, is_all_day, is_recurring,
                created_at, updated_at
            FROM events
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// List the user's events, optionally restricted to those overlapping
    /// `[from, to)`, ordered by start time.
    pub async fn list_for_user(
        pool: &SqlitePool,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Event>> {
        let mut sql = String::from(
            r#"
            SELECT
                id, user_id, title, description, location, category,
                start_time, end_time, is_all_day, is_recurring,
                created_at, updated_at
            FROM events
            WHERE user_id = ?
            "#,
        );
        if from.is_some() {
            sql.push_str(" AND end_time >= ?");
        }
        if to.is_some() {
            sql.push_str(" AND start_time < ?");
        }
        sql.push_str(" ORDER BY start_time ASC, id ASC");

        let mut q = sqlx::query_as::<_, Event>(&sql).bind(user_id);
        if let Some(from) = from {
            q = q.bind(from);
        }
        if let Some(to) = to {
            q = q.bind(to);
        }

        q.fetch_all(pool).await.map_err(AppError::Database)
    }

    /// Apply a partial update. Returns `None` when the event does not exist
    /// or belongs to another user.
    pub async fn update(
        pool: &SqlitePool,
        id: i64,
        user_id: &str,
        update: UpdateEvent,
    ) -> AppResult<Option<Event>> {
        let current = match Self::find_for_user(pool, id, user_id).await? {
            Some(event) => event,
            None => return Ok(None),
        };

        let now = Utc::now();
        sqlx::query_as::<_, Event>(
            r#"
            UPDATE events
            SET title = ?,
                description = ?,
                location = ?,
                category = ?,
                start_time = ?,
                end_time = ?,
                is_all_day = ?,
                is_recurring = ?,
                updated_at = ?
            WHERE id = ? AND user_id = ?
            RETURNING
                id, user_id, title, description, location, category,
                start_time, end_time, is_all_day, is_recurring,
                created_at, updated_at
            "#,
        )
        .bind(update.title.unwrap_or(current.title))
        .bind(update.description.or(current.description))
        .bind(update.location.or(current.location))
        .bind(update.category.or(current.category))
        .bind(update.start_time.unwrap_or(current.start_time))
        .bind(update.end_time.unwrap_or(current.end_time))
        .bind(update.is_all_day.unwrap_or(current.is_all_day))
        .bind(update.is_recurring.unwrap_or(current.is_recurring))
        .bind(now)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(AppError::Database)
    }

    /// Delete an event (its reminders cascade). Returns whether a row was removed.
    pub async fn delete(pool: &SqlitePool, id: i64, user_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await
            .map_err(AppError::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
