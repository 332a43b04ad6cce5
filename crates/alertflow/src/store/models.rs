use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::alert::{AlertSource, AlertStatus, Severity, UnifiedAlert};

// Persisted alert, keyed by fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(flatten)]
    pub alert: UnifiedAlert,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AlertEvent> for UnifiedAlert {
    fn from(event: AlertEvent) -> Self {
        event.alert
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFilter {
    pub source: Option<AlertSource>,
    pub alert_name: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
    pub workload_id: Option<String>,
    pub pod_name: Option<String>,
    pub node_name: Option<String>,
    pub cluster_name: Option<String>,
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// Entity key used to narrow the correlation candidate query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKey {
    Workload(String),
    Pod(String),
    Node(String),
}

#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub exclude_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub entity: Option<EntityKey>,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationType {
    Time,
    Entity,
    Causal,
    CrossSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub correlation_id: String,
    pub alert_id: String,
    pub related_alert_id: String,
    pub correlation_type: CorrelationType,
    pub correlation_score: f64,
    pub correlation_reason: String,
    #[serde(default)]
    pub correlation_metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

// Silences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SilenceType {
    Label,
    AlertName,
    Resource,
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOperator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "=~")]
    Regex,
    #[serde(rename = "!~")]
    NotRegex,
}

impl Default for MatchOperator {
    fn default() -> Self {
        MatchOperator::Equal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMatcher {
    pub key: String,
    #[serde(default)]
    pub operator: MatchOperator,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub resource_type: String,
    pub resource_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Silence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
    pub silence_type: SilenceType,
    #[serde(default)]
    pub label_matchers: Vec<LabelMatcher>,
    #[serde(default)]
    pub alert_names: Vec<String>,
    #[serde(default)]
    pub resource_filters: Vec<ResourceFilter>,
    #[serde(default)]
    pub match_expression: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Silence {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.starts_at <= now && self.ends_at.map_or(true, |end| now <= end)
    }
}

// Append-only audit of suppressed alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilencedAlert {
    pub silence_id: String,
    pub alert_id: String,
    pub alert_name: String,
    pub cluster_name: String,
    pub silenced_at: DateTime<Utc>,
    pub reason: String,
    pub alert_data: JsonValue,
}

// Routing rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cluster_name: String,
    pub enabled: bool,
    #[serde(default)]
    pub alert_group: String,
    #[serde(default)]
    pub route_config: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Notification delivery tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub alert_id: String,
    pub channel: String,
    pub channel_config: JsonValue,
    pub status: NotificationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

// Statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatPeriod {
    Hour,
    Day,
}

/// Identity of one statistics bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsKey {
    pub date: NaiveDate,
    pub hour: u32,
    pub period: StatPeriod,
    pub alert_name: String,
    pub source: AlertSource,
    pub severity: Severity,
    pub workload_id: String,
    pub cluster_name: String,
}

/// Increment applied to one bucket by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsDelta {
    pub key: StatisticsKey,
    pub firing: i64,
    pub resolved: i64,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertStatistic {
    #[serde(flatten)]
    pub key: StatisticsKey,
    pub firing_count: i64,
    pub resolved_count: i64,
    pub total_duration_seconds: f64,
    pub avg_duration_seconds: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct StatisticsFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub period: Option<StatPeriod>,
    pub alert_name: Option<String>,
    pub cluster_name: Option<String>,
    pub limit: i64,
}

// Aggregates backing the dashboard read endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeverityCount {
    pub severity: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub bucket: String,
    pub severity: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

// Entity metadata consulted by the enricher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMeta {
    pub workload_id: String,
    pub name: String,
    pub namespace: String,
    pub kind: String,
    pub status: String,
    pub cluster_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodMeta {
    pub pod_id: String,
    pub name: String,
    pub namespace: String,
    pub phase: String,
    pub node_name: String,
    pub gpu_allocated: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub name: String,
    pub address: String,
    pub status: String,
}
