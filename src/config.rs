use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub reminders: ReminderConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for auth endpoints (e.g. /api/auth/login)
    pub auth_per_second: u32,
    /// Burst size for auth endpoints
    pub auth_burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// How often (seconds) the stale due-time sweep runs.
    pub sweep_interval_seconds: u64,
    /// Maximum reminders recomputed per sweep.
    pub sweep_batch_size: i64,
    /// Window (hours) for the "recently notified" view.
    pub recent_window_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Outbound mail webhook. Email reminder delivery is disabled when unset.
    pub webhook_url: Option<String>,
    /// How often (seconds) the email worker looks for due reminders.
    pub poll_interval_seconds: u64,
    /// Maximum reminders claimed per email poll.
    pub batch_size: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/timelence.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
                expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24),
            },
            rate_limit: RateLimitConfig {
                auth_per_second: env::var("RATE_LIMIT_AUTH_PER_SECOND")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
                auth_burst: env::var("RATE_LIMIT_AUTH_BURST")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
            },
            reminders: ReminderConfig {
                sweep_interval_seconds: env::var("REMINDER_SWEEP_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300u64),
                sweep_batch_size: env::var("REMINDER_SWEEP_BATCH_SIZE")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500i64),
                recent_window_hours: env::var("REMINDER_RECENT_WINDOW_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .unwrap_or(24i64),
            },
            mail: MailConfig {
                webhook_url: env::var("MAIL_WEBHOOK_URL")
                    .ok()
                    .filter(|v| !v.trim().is_empty()),
                poll_interval_seconds: env::var("REMINDER_EMAIL_POLL_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60u64),
                batch_size: env::var("REMINDER_EMAIL_BATCH_SIZE")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50i64),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/timelence.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 24,
            },
            rate_limit: RateLimitConfig {
                auth_per_second: 3,
                auth_burst: 10,
            },
            reminders: ReminderConfig {
                sweep_interval_seconds: 300,
                sweep_batch_size: 500,
                recent_window_hours: 24,
            },
            mail: MailConfig {
                webhook_url: None,
                poll_interval_seconds: 60,
                batch_size: 50,
            },
        }
    }
}

/// How the notification agent authenticates against the server.
#[derive(Debug, Clone)]
pub enum AgentCredentials {
    Token(String),
    Password { email: String, password: String },
}

/// Configuration of the `timelence-agent` binary.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_url: String,
    pub credentials: AgentCredentials,
    pub poll_interval_seconds: u64,
    pub auto_dismiss_seconds: u64,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let credentials = match env::var("TIMELENCE_TOKEN").ok().filter(|t| !t.is_empty()) {
            Some(token) => AgentCredentials::Token(token),
            None => AgentCredentials::Password {
                email: env::var("TIMELENCE_EMAIL")
                    .map_err(|_| ConfigError::MissingEnv("TIMELENCE_TOKEN or TIMELENCE_EMAIL".to_string()))?,
                password: env::var("TIMELENCE_PASSWORD")
                    .map_err(|_| ConfigError::MissingEnv("TIMELENCE_PASSWORD".to_string()))?,
            },
        };

        let poll_interval_seconds: u64 = env::var("AGENT_POLL_INTERVAL_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("AGENT_POLL_INTERVAL_SECONDS".to_string()))?;
        if poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "AGENT_POLL_INTERVAL_SECONDS".to_string(),
            ));
        }

        Ok(AgentConfig {
            api_url: env::var("TIMELENCE_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            credentials,
            poll_interval_seconds,
            auto_dismiss_seconds: env::var("AGENT_AUTO_DISMISS_SECONDS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
        })
    }
}
