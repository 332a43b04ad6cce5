use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::{dispatcher::WorkerConfig, store::DatabaseConfig, Error, Result};

pub const DEFAULT_WEBHOOK_URL: &str = "http://localhost:8080/v1/alerts/webhook/default-sink";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub workers: WorkerSettings,
    pub notifications: NotificationConfig,
    /// Cluster assigned to enriched alerts that arrive without one.
    pub default_cluster_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub queue_capacity: usize,
    pub statistics_workers: usize,
    pub correlation_workers: usize,
    pub notification_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub default_webhook_url: String,
    pub timeout_secs: u64,
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        WorkerConfig {
            queue_capacity: settings.queue_capacity,
            statistics_workers: settings.statistics_workers,
            correlation_workers: settings.correlation_workers,
            notification_workers: settings.notification_workers,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", key, raw))),
        None => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Config::default();
        let config = Config {
            server: ServerConfig {
                addr: lookup("SERVER_ADDR").unwrap_or(defaults.server.addr),
            },
            database: DatabaseConfig {
                sqlite_path: lookup("SQLITE_PATH")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.database.sqlite_path),
                max_connections: parsed(
                    &lookup,
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            workers: WorkerSettings {
                queue_capacity: parsed(&lookup, "QUEUE_CAPACITY", defaults.workers.queue_capacity)?,
                statistics_workers: parsed(&lookup, "STATS_WORKERS", defaults.workers.statistics_workers)?,
                correlation_workers: parsed(
                    &lookup,
                    "CORRELATION_WORKERS",
                    defaults.workers.correlation_workers,
                )?,
                notification_workers: parsed(
                    &lookup,
                    "NOTIFY_WORKERS",
                    defaults.workers.notification_workers,
                )?,
            },
            notifications: NotificationConfig {
                default_webhook_url: lookup("DEFAULT_WEBHOOK_URL")
                    .unwrap_or(defaults.notifications.default_webhook_url),
                timeout_secs: parsed(&lookup, "NOTIFY_TIMEOUT_SECS", defaults.notifications.timeout_secs)?,
            },
            default_cluster_name: lookup("DEFAULT_CLUSTER_NAME").unwrap_or(defaults.default_cluster_name),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().map_err(Error::Config)?;
        if self.workers.queue_capacity == 0 {
            return Err(Error::Config("QUEUE_CAPACITY must be at least 1".to_string()));
        }
        for (key, count) in [
            ("STATS_WORKERS", self.workers.statistics_workers),
            ("CORRELATION_WORKERS", self.workers.correlation_workers),
            ("NOTIFY_WORKERS", self.workers.notification_workers),
        ] {
            if count == 0 {
                return Err(Error::Config(format!("{} must be at least 1", key)));
            }
        }
        if self.notifications.timeout_secs == 0 {
            return Err(Error::Config("NOTIFY_TIMEOUT_SECS must be at least 1".to_string()));
        }
        url::Url::parse(&self.notifications.default_webhook_url)
            .map_err(|e| Error::Config(format!("DEFAULT_WEBHOOK_URL is not a valid URL: {}", e)))?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let workers = WorkerConfig::default();
        Self {
            server: ServerConfig {
                addr: "0.0.0.0:8080".to_string(),
            },
            database: DatabaseConfig::default(),
            workers: WorkerSettings {
                queue_capacity: workers.queue_capacity,
                statistics_workers: workers.statistics_workers,
                correlation_workers: workers.correlation_workers,
                notification_workers: workers.notification_workers,
            },
            notifications: NotificationConfig {
                default_webhook_url: DEFAULT_WEBHOOK_URL.to_string(),
                timeout_secs: 10,
            },
            default_cluster_name: "default".to_string(),
        }
    }
}
