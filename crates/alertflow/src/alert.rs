//! The in-flight alert model shared by every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSource {
    Metric,
    Log,
    Trace,
    Webhook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
    Silenced,
}

impl Severity {
    /// Parses a severity coming off the wire, falling back when the sender
    /// used a value outside the known set.
    pub fn parse_or(value: &str, fallback: Severity) -> Severity {
        value.trim().to_lowercase().parse().unwrap_or(fallback)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl AlertStatus {
    pub fn parse_or(value: &str, fallback: AlertStatus) -> AlertStatus {
        value.trim().to_lowercase().parse().unwrap_or(fallback)
    }
}

impl std::str::FromStr for AlertSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "metric" => Ok(AlertSource::Metric),
            "log" => Ok(AlertSource::Log),
            "trace" => Ok(AlertSource::Trace),
            "webhook" => Ok(AlertSource::Webhook),
            _ => Err(Error::Validation(format!("Invalid alert source: {}", s))),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            _ => Err(Error::Validation(format!("Invalid alert severity: {}", s))),
        }
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "firing" => Ok(AlertStatus::Firing),
            "resolved" => Ok(AlertStatus::Resolved),
            "silenced" => Ok(AlertStatus::Silenced),
            _ => Err(Error::Validation(format!("Invalid alert status: {}", s))),
        }
    }
}

impl std::fmt::Display for AlertSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSource::Metric => write!(f, "metric"),
            AlertSource::Log => write!(f, "log"),
            AlertSource::Trace => write!(f, "trace"),
            AlertSource::Webhook => write!(f, "webhook"),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::Silenced => write!(f, "silenced"),
        }
    }
}

/// Normalized alert, produced by a receiver and carried through the pipeline.
///
/// `id` is the fingerprint and never changes once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedAlert {
    pub id: String,
    pub source: AlertSource,
    pub alert_name: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub starts_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub workload_id: String,
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub pod_id: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub raw_data: JsonValue,
    #[serde(default)]
    pub enriched_data: HashMap<String, JsonValue>,
}

impl UnifiedAlert {
    pub fn new(id: impl Into<String>, source: AlertSource, alert_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            alert_name: alert_name.into(),
            severity: Severity::Warning,
            status: AlertStatus::Firing,
            starts_at: Utc::now(),
            ends_at: None,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            workload_id: String::new(),
            pod_name: String::new(),
            pod_id: String::new(),
            node_name: String::new(),
            cluster_name: String::new(),
            raw_data: JsonValue::Null,
            enriched_data: HashMap::new(),
        }
    }

    pub fn is_firing(&self) -> bool {
        self.status == AlertStatus::Firing
    }
}
