use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Longest lead time a reminder may have (one week).
pub const MAX_MINUTES_BEFORE: i64 = 7 * 24 * 60;

/// Channel(s) a reminder is delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ReminderType {
    Email,
    Popup,
    Both,
}

impl ReminderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderType::Email => "email",
            ReminderType::Popup => "popup",
            ReminderType::Both => "both",
        }
    }

    pub fn includes(&self, channel: DeliveryChannel) -> bool {
        matches!(
            (self, channel),
            (ReminderType::Both, _)
                | (ReminderType::Email, DeliveryChannel::Email)
                | (ReminderType::Popup, DeliveryChannel::Popup)
        )
    }
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(ReminderType::Email),
            "popup" => Ok(ReminderType::Popup),
            "both" => Ok(ReminderType::Both),
            other => Err(format!("unknown reminder type '{}'", other)),
        }
    }
}

/// A single delivery channel, as queried by pollers. Each channel has its own
/// delivery marker column so `both` reminders are delivered once per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    Popup,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Email => "email",
            DeliveryChannel::Popup => "popup",
        }
    }

    /// Column recording delivery through this channel.
    pub(crate) fn sent_column(&self) -> &'static str {
        match self {
            DeliveryChannel::Email => "email_sent_at",
            DeliveryChannel::Popup => "sent_at",
        }
    }
}

impl FromStr for DeliveryChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(DeliveryChannel::Email),
            "popup" => Ok(DeliveryChannel::Popup),
            other => Err(format!("unknown delivery channel '{}'", other)),
        }
    }
}

/// A stored reminder row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub event_id: i64,
    pub reminder_type: ReminderType,
    pub minutes_before: i64,

    /// `event.start_time - minutes_before`; only ever written by the scheduler.
    pub due_time: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub due_basis_start: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub due_basis_minutes: Option<i64>,

    /// Popup delivery marker.
    pub sent_at: Option<DateTime<Utc>>,
    pub email_sent_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reminder definition supplied by a client when creating or replacing a
/// reminder set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminder {
    pub reminder_type: ReminderType,
    pub minutes_before: i64,
}

/// Reminder joined with its event, as exposed to notification clients.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PendingReminder {
    pub reminder_id: i64,
    pub event_id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub minutes_before: i64,
    pub reminder_type: ReminderType,
    pub due_time: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl PendingReminder {
    /// Human readable lead, e.g. "in 15 minutes".
    pub fn lead_description(&self) -> String {
        describe_lead(self.minutes_before)
    }
}

/// Render a lead time the way reminders phrase it.
pub fn describe_lead(minutes_before: i64) -> String {
    fn plural(n: i64, unit: &str) -> String {
        if n == 1 {
            format!("in 1 {}", unit)
        } else {
            format!("in {} {}s", n, unit)
        }
    }

    match minutes_before {
        m if m <= 0 => "now".to_string(),
        m if m % (24 * 60) == 0 => plural(m / (24 * 60), "day"),
        m if m % 60 == 0 => plural(m / 60, "hour"),
        m => plural(m, "minute"),
    }
}

/// Due email reminder with the recipient resolved.
#[derive(Debug, Clone, FromRow)]
pub struct EmailReminder {
    pub reminder_id: i64,
    pub event_id: i64,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub minutes_before: i64,
    pub due_time: DateTime<Utc>,
    pub email: String,
    pub display_name: String,
}

/// Scheduler view of a reminder: the row plus its event's live start time.
/// `event_start` is `None` when the owning event no longer exists.
#[derive(Debug, Clone, FromRow)]
pub struct ReminderSchedule {
    pub reminder_id: i64,
    pub event_id: i64,
    pub minutes_before: i64,
    pub due_time: Option<DateTime<Utc>>,
    pub event_start: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reminder_type_channel_membership() {
        assert!(ReminderType::Both.includes(DeliveryChannel::Popup));
        assert!(ReminderType::Both.includes(DeliveryChannel::Email));
        assert!(ReminderType::Popup.includes(DeliveryChannel::Popup));
        assert!(!ReminderType::Popup.includes(DeliveryChannel::Email));
        assert!(!ReminderType::Email.includes(DeliveryChannel::Popup));
    }

    #[test]
    fn parse_reminder_type_and_channel() {
        assert_eq!("Popup".parse::<ReminderType>(), Ok(ReminderType::Popup));
        assert_eq!(" both ".parse::<ReminderType>(), Ok(ReminderType::Both));
        assert!("sms".parse::<ReminderType>().is_err());

        assert_eq!("email".parse::<DeliveryChannel>(), Ok(DeliveryChannel::Email));
        // `both` is a reminder setting, not something a poller can ask for
        assert!("both".parse::<DeliveryChannel>().is_err());
    }

    #[test]
    fn lead_descriptions() {
        assert_eq!(describe_lead(0), "now");
        assert_eq!(describe_lead(1), "in 1 minute");
        assert_eq!(describe_lead(15), "in 15 minutes");
        assert_eq!(describe_lead(60), "in 1 hour");
        assert_eq!(describe_lead(90), "in 90 minutes");
        assert_eq!(describe_lead(120), "in 2 hours");
        assert_eq!(describe_lead(MAX_MINUTES_BEFORE), "in 7 days");
    }
}
