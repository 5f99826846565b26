use std::env;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub writable: WritableConfig,
    pub smtp: SmtpConfig,
    pub retention: RetentionConfig,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Service-wide resend defaults, overridable per subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct WritableConfig {
    pub resend_limit: i32,
    /// Duration string such as "5s" or "1m30s".
    pub resend_interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// Envelope sender used for `MAIL FROM`.
    pub sender: String,
    pub subject: String,
    /// Accept self-signed certificates during STARTTLS.
    pub enable_self_signed_cert: bool,
    /// Secret store path holding `username` / `password`.
    pub secret_path: String,
    /// "usernamepassword" or "none".
    pub auth_mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub enabled: bool,
    /// How often the purge check runs, e.g. "30m".
    pub interval: String,
    /// Purge is triggered once the stored notification count reaches this value.
    pub max_cap: i64,
    /// Number of newest notifications kept by a purge.
    pub min_cap: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub rest_timeout_seconds: u64,
    /// Bounded wait for MQTT connect and publish.
    pub client_wait_seconds: u64,
}

impl ChannelConfig {
    pub fn rest_timeout(&self) -> Duration {
        Duration::from_secs(self.rest_timeout_seconds)
    }

    pub fn client_wait(&self) -> Duration {
        Duration::from_secs(self.client_wait_seconds)
    }
}

fn parse_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string())),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or(defaults.server.host),
                port: parse_number("PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_number(
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            writable: WritableConfig {
                resend_limit: parse_number("RESEND_LIMIT", defaults.writable.resend_limit)?,
                resend_interval: env::var("RESEND_INTERVAL")
                    .unwrap_or(defaults.writable.resend_interval),
            },
            smtp: SmtpConfig {
                host: env::var("SMTP_HOST").unwrap_or(defaults.smtp.host),
                port: parse_number("SMTP_PORT", defaults.smtp.port)?,
                sender: env::var("SMTP_SENDER").unwrap_or(defaults.smtp.sender),
                subject: env::var("SMTP_SUBJECT").unwrap_or(defaults.smtp.subject),
                enable_self_signed_cert: parse_bool(
                    "SMTP_ENABLE_SELF_SIGNED_CERT",
                    defaults.smtp.enable_self_signed_cert,
                ),
                secret_path: env::var("SMTP_SECRET_PATH").unwrap_or(defaults.smtp.secret_path),
                auth_mode: env::var("SMTP_AUTH_MODE").unwrap_or(defaults.smtp.auth_mode),
            },
            retention: RetentionConfig {
                enabled: parse_bool("RETENTION_ENABLED", defaults.retention.enabled),
                interval: env::var("RETENTION_INTERVAL").unwrap_or(defaults.retention.interval),
                max_cap: parse_number("RETENTION_MAX_CAP", defaults.retention.max_cap)?,
                min_cap: parse_number("RETENTION_MIN_CAP", defaults.retention.min_cap)?,
            },
            channels: ChannelConfig {
                rest_timeout_seconds: parse_number(
                    "REST_TIMEOUT_SECONDS",
                    defaults.channels.rest_timeout_seconds,
                )?,
                client_wait_seconds: parse_number(
                    "CLIENT_WAIT_SECONDS",
                    defaults.channels.client_wait_seconds,
                )?,
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 59860,
            },
            database: DatabaseConfig {
                url: "sqlite://data/notifications.db".to_string(),
                max_connections: 5,
            },
            writable: WritableConfig {
                resend_limit: 2,
                resend_interval: "5s".to_string(),
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 25,
                sender: "notifications@localhost".to_string(),
                subject: "Edge Notifications".to_string(),
                enable_self_signed_cert: false,
                secret_path: "smtp".to_string(),
                auth_mode: "usernamepassword".to_string(),
            },
            retention: RetentionConfig {
                enabled: true,
                interval: "30m".to_string(),
                max_cap: 5000,
                min_cap: 4000,
            },
            channels: ChannelConfig {
                rest_timeout_seconds: 30,
                client_wait_seconds: 5,
            },
        }
    }
}
