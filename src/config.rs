//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Ledger database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Pool acquire timeout and deadline of one unit of work
    pub store_timeout: Duration,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Where committed transactions are published
    pub queue: QueueConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "DATABASE_URL")?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let store_timeout = millis_or(&lookup, "STORE_TIMEOUT_MS", 5_000)?;
        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "PORT", 8080)?;
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let queue = QueueConfig::from_lookup(&lookup)?;

        Ok(Self {
            database_url,
            database_max_connections,
            store_timeout,
            host,
            port,
            environment,
            queue,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// NATS JetStream settings shared by publisher and replicator
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub nats_url: String,
    pub stream: String,
    pub subject: String,
    pub publish_max_attempts: u32,
    pub publish_timeout: Duration,
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let publish_max_attempts = parse_or(&lookup, "PUBLISH_MAX_ATTEMPTS", 3)?;
        if publish_max_attempts == 0 {
            return Err(ConfigError::InvalidValue("PUBLISH_MAX_ATTEMPTS"));
        }

        Ok(Self {
            nats_url: lookup("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string()),
            stream: lookup("NATS_STREAM").unwrap_or_else(|| "TRANSACTIONS".to_string()),
            subject: lookup("NATS_SUBJECT").unwrap_or_else(|| "ledger.transactions".to_string()),
            publish_max_attempts,
            publish_timeout: millis_or(&lookup, "PUBLISH_TIMEOUT_MS", 5_000)?,
        })
    }
}

/// History replicator configuration
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// History database connection URL
    pub history_database_url: String,

    pub history_max_connections: u32,

    pub store_timeout: Duration,

    /// Durable consumer name; restarts resume from its position
    pub durable_name: String,

    /// Broker redelivers a message not settled within this window
    pub ack_wait: Duration,

    /// Delay requested when a message is naked
    pub redelivery_delay: Duration,

    /// Prometheus listener, disabled when unset
    pub metrics_addr: Option<SocketAddr>,

    pub queue: QueueConfig,
}

impl ReplicatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let metrics_addr = match lookup("METRICS_ADDR") {
            Some(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("METRICS_ADDR"))?,
            ),
            _ => None,
        };

        Ok(Self {
            history_database_url: required(&lookup, "HISTORY_DATABASE_URL")?,
            history_max_connections: parse_or(&lookup, "HISTORY_MAX_CONNECTIONS", 5)?,
            store_timeout: millis_or(&lookup, "STORE_TIMEOUT_MS", 5_000)?,
            durable_name: lookup("REPLICATOR_DURABLE_NAME")
                .unwrap_or_else(|| "history-replicator".to_string()),
            ack_wait: millis_or(&lookup, "REPLICATOR_ACK_WAIT_MS", 30_000)?,
            redelivery_delay: millis_or(&lookup, "REPLICATOR_REDELIVERY_DELAY_MS", 1_000)?,
            metrics_addr,
            queue: QueueConfig::from_lookup(&lookup)?,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingEnv(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

fn millis_or<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let millis: u64 = parse_or(lookup, key, default)?;
    if millis == 0 {
        return Err(ConfigError::InvalidValue(key));
    }
    Ok(Duration::from_millis(millis))
}

/// Configuration error types
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
