//! Terminal notification agent: polls the server for due popup reminders and
//! prints them until interrupted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timelence::agent::{
    AgentSettings, DisplayError, HttpReminderFeed, Notification, NotificationAgent,
    NotificationBackend, Permission, PermissionState, Toast, ToastSink,
};
use timelence::config::{AgentConfig, AgentCredentials};

/// Renders notifications and toasts on stdout.
struct ConsoleNotifier;

#[async_trait]
impl NotificationBackend for ConsoleNotifier {
    fn is_supported(&self) -> bool {
        true
    }

    fn permission(&self) -> Permission {
        Permission::Default
    }

    async fn request_permission(&self) -> Result<Permission, DisplayError> {
        Ok(Permission::Granted)
    }

    async fn show(
        &self,
        notification: &Notification,
        _auto_dismiss: Duration,
    ) -> Result<(), DisplayError> {
        println!("\u{1F514} {}: {}", notification.title, notification.body);
        Ok(())
    }
}

impl ToastSink for ConsoleNotifier {
    fn toast(&self, toast: Toast) {
        println!("[{}] {}", toast.title, toast.message);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timelence=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AgentConfig::from_env()?;
    let feed = match &config.credentials {
        AgentCredentials::Token(token) => HttpReminderFeed::new(&config.api_url, token.clone())?,
        AgentCredentials::Password { email, password } => {
            HttpReminderFeed::login(&config.api_url, email, password).await?
        }
    };
    tracing::info!("Connected to {}", config.api_url);

    let console = Arc::new(ConsoleNotifier);
    let settings = AgentSettings {
        poll_interval: Duration::from_secs(config.poll_interval_seconds),
        auto_dismiss: Duration::from_secs(config.auto_dismiss_seconds),
    };
    let mut agent = NotificationAgent::new(console.clone(), console, settings);

    if agent.state() == PermissionState::Unrequested {
        agent.request_permission().await?;
    }
    agent.start_polling(Arc::new(feed))?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, stopping agent");
    agent.logout().await;
    Ok(())
}
