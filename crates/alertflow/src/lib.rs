pub mod alert;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod metrics;
pub mod notifier;
pub mod pipeline;
pub mod processor;
pub mod receivers;
pub mod router;
pub mod server;
pub mod store;
pub mod template;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Email error: {0}")]
    Email(String),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
    #[error("Notification error: {0}")]
    Notification(String),
    #[error("Queue closed: {0}")]
    QueueClosed(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
