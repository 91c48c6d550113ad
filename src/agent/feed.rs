//! Where the agent gets its reminders from.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use url::Url;

use crate::db::PendingReminder;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session is no longer valid")]
    Unauthorized,

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Authenticated view of one user's popup reminders.
#[async_trait]
pub trait ReminderFeed: Send + Sync + 'static {
    /// Due, undisplayed popup reminders, earliest due first.
    async fn pending(&self) -> Result<Vec<PendingReminder>, FeedError>;

    async fn mark_sent(&self, reminder_id: i64) -> Result<(), FeedError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct LoginData {
    token: String,
}

/// [`ReminderFeed`] over the server's JSON API using a bearer token.
pub struct HttpReminderFeed {
    client: reqwest::Client,
    base: Url,
    token: String,
}

impl HttpReminderFeed {
    /// `base_url` may carry a path prefix (`https://host/timelence`); API
    /// paths are resolved below it.
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            base,
            token: token.into(),
        })
    }

    /// Log in with email and password and use the returned token.
    pub async fn login(base_url: &str, email: &str, password: &str) -> Result<Self, FeedError> {
        let mut feed = Self::new(base_url, String::new())?;
        let resp = feed
            .client
            .post(feed.base.join("api/auth/login")?)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let login: LoginData = read_envelope(resp).await?;
        feed.token = login.token;
        Ok(feed)
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

#[async_trait]
impl ReminderFeed for HttpReminderFeed {
    async fn pending(&self) -> Result<Vec<PendingReminder>, FeedError> {
        let resp = self
            .client
            .get(self.base.join("api/notifications/pending")?)
            .query(&[("type", "popup")])
            .bearer_auth(&self.token)
            .send()
            .await?;
        read_envelope(resp).await
    }

    async fn mark_sent(&self, reminder_id: i64) -> Result<(), FeedError> {
        let path = format!("api/notifications/{}/mark-sent", reminder_id);
        let resp = self
            .client
            .post(self.base.join(&path)?)
            .bearer_auth(&self.token)
            .send()
            .await?;
        check_status(resp).await.map(|_| ())
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, FeedError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(FeedError::Unauthorized);
    }
    let message = match resp.json::<ErrorEnvelope>().await {
        Ok(body) => body.error.message,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    };
    Err(FeedError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, FeedError> {
    let resp = check_status(resp).await?;
    let envelope: Envelope<T> = resp.json().await?;
    Ok(envelope.data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_base_url() {
        assert!(matches!(
            HttpReminderFeed::new("not a url", "t"),
            Err(FeedError::InvalidUrl(_))
        ));
        let feed = HttpReminderFeed::new("http://localhost:8080", "abc").unwrap();
        assert_eq!(feed.token(), "abc");
    }

    #[test]
    fn api_paths_keep_the_base_prefix() {
        for base in ["https://host/timelence", "https://host/timelence/"] {
            let feed = HttpReminderFeed::new(base, "t").unwrap();
            assert_eq!(
                feed.base.join("api/notifications/pending").unwrap().as_str(),
                "https://host/timelence/api/notifications/pending"
            );
        }
        let feed = HttpReminderFeed::new("http://localhost:8080", "t").unwrap();
        assert_eq!(
            feed.base.join("api/auth/login").unwrap().as_str(),
            "http://localhost:8080/api/auth/login"
        );
    }

    #[test]
    fn pending_payload_decodes() {
        let body = r#"{
            "success": true,
            "data": [{
                "reminder_id": 42,
                "event_id": 7,
                "title": "Standup",
                "start_time": "2025-01-10T10:00:00Z",
                "minutes_before": 15,
                "reminder_type": "both",
                "due_time": "2025-01-10T09:45:00Z",
                "sent_at": null
            }]
        }"#;
        let envelope: Envelope<Vec<PendingReminder>> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].reminder_id, 42);
        assert_eq!(envelope.data[0].minutes_before, 15);
    }
}
