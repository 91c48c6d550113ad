//! Keeps every reminder's `due_time` consistent with its event.
//!
//! `due_time = event.start_time - minutes_before`. It is never written by
//! anything but this module: CRUD paths call [`ReminderScheduler::recompute_due_times`]
//! after committing a change, and a periodic sweep calls
//! [`ReminderScheduler::recompute_stale`] to catch rows that were left behind.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::db::{ReminderRepository, ReminderSchedule, MAX_MINUTES_BEFORE};
use crate::error::AppResult;

/// Outcome of one recompute batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("event {0} no longer exists")]
    MissingEvent(i64),

    #[error("lead time of {0} minutes is out of range")]
    LeadOutOfRange(i64),

    #[error("due time is not representable")]
    Overflow,
}

pub struct ReminderScheduler;

impl ReminderScheduler {
    /// `start - minutes_before`, rejecting lead times outside `[0, one week]`.
    pub fn compute_due_time(
        start: DateTime<Utc>,
        minutes_before: i64,
    ) -> Result<DateTime<Utc>, ScheduleError> {
        if !(0..=MAX_MINUTES_BEFORE).contains(&minutes_before) {
            return Err(ScheduleError::LeadOutOfRange(minutes_before));
        }
        start
            .checked_sub_signed(Duration::minutes(minutes_before))
            .ok_or(ScheduleError::Overflow)
    }

    /// Recompute the stale reminders of one event. Must be awaited by the
    /// request that changed the event or its reminder set before it responds.
    pub async fn recompute_due_times(
        pool: &SqlitePool,
        event_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<RecomputeSummary> {
        let stale = ReminderRepository::stale_for_event(pool, event_id).await?;
        let summary = Self::apply(pool, stale, now).await;

        if summary.updated > 0 || summary.skipped > 0 {
            tracing::debug!(
                event_id,
                updated = summary.updated,
                skipped = summary.skipped,
                "Recomputed reminder due times"
            );
        }
        Ok(summary)
    }

    /// Recompute up to `limit` stale reminders across all events.
    pub async fn recompute_stale(
        pool: &SqlitePool,
        limit: i64,
        now: DateTime<Utc>,
    ) -> AppResult<RecomputeSummary> {
        let stale = ReminderRepository::stale(pool, limit).await?;
        Ok(Self::apply(pool, stale, now).await)
    }

    async fn apply(
        pool: &SqlitePool,
        stale: Vec<ReminderSchedule>,
        now: DateTime<Utc>,
    ) -> RecomputeSummary {
        let mut summary = RecomputeSummary::default();

        for schedule in stale {
            let planned = Self::plan(&schedule, now);
            let (due_time, start, rearm) = match planned {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(
                        reminder_id = schedule.reminder_id,
                        "Skipping reminder due-time computation: {}",
                        e
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            match ReminderRepository::set_due_time(
                pool,
                schedule.reminder_id,
                due_time,
                start,
                schedule.minutes_before,
                rearm,
            )
            .await
            {
                Ok(true) => summary.updated += 1,
                Ok(false) => {
                    // deleted or rescheduled between the read and the write
                    summary.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        reminder_id = schedule.reminder_id,
                        "Failed to persist reminder due time: {:?}",
                        e
                    );
                    summary.skipped += 1;
                }
            }
        }

        summary
    }

    /// Work out the new due time for a stale reminder and whether its
    /// delivery markers should be cleared. A reminder is re-armed when its due
    /// time moves to a different instant that is still in the future.
    fn plan(
        schedule: &ReminderSchedule,
        now: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>, bool), ScheduleError> {
        let start = schedule
            .event_start
            .ok_or(ScheduleError::MissingEvent(schedule.event_id))?;
        let due_time = Self::compute_due_time(start, schedule.minutes_before)?;
        let rearm = matches!(schedule.due_time, Some(previous) if previous != due_time)
            && due_time > now;
        Ok((due_time, start, rearm))
    }
}
