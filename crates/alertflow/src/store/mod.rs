mod config;
mod models;
mod sqlite;
mod factory;

pub use config::DatabaseConfig;
pub use models::*;
pub use sqlite::SqliteStore;
pub use factory::create_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alert::UnifiedAlert;

#[async_trait]
pub trait Store: Send + Sync {
    // Initialize database schema
    async fn init(&self) -> crate::Result<()>;

    // Alert events
    /// Inserts the alert unless a row with the same id exists. Returns
    /// whether a row was written.
    async fn insert_alert_event(&self, alert: &UnifiedAlert) -> crate::Result<bool>;
    async fn get_alert_event(&self, id: &str) -> crate::Result<Option<AlertEvent>>;
    async fn get_alert_events(&self, ids: &[String]) -> crate::Result<Vec<AlertEvent>>;
    async fn resolve_alert_event(&self, id: &str, ends_at: DateTime<Utc>) -> crate::Result<()>;
    async fn list_alert_events(&self, filter: &AlertFilter) -> crate::Result<Vec<AlertEvent>>;
    async fn find_correlation_candidates(&self, query: &CandidateQuery) -> crate::Result<Vec<AlertEvent>>;

    // Correlations
    async fn save_correlations(&self, records: &[CorrelationRecord]) -> crate::Result<()>;
    async fn list_correlations_for_alert(&self, alert_id: &str) -> crate::Result<Vec<CorrelationRecord>>;
    async fn list_correlation_group(&self, correlation_id: &str) -> crate::Result<Vec<CorrelationRecord>>;

    // Silences
    async fn save_silence(&self, silence: &Silence) -> crate::Result<()>;
    async fn get_silence(&self, id: &str) -> crate::Result<Option<Silence>>;
    async fn list_silences(&self) -> crate::Result<Vec<Silence>>;
    async fn list_active_silences(&self, now: DateTime<Utc>) -> crate::Result<Vec<Silence>>;
    async fn delete_silence(&self, id: &str) -> crate::Result<bool>;
    async fn record_silenced_alert(&self, record: &SilencedAlert) -> crate::Result<()>;
    async fn list_silenced_alerts(&self, alert_id: &str) -> crate::Result<Vec<SilencedAlert>>;

    // Alert rules
    async fn save_alert_rule(&self, rule: &AlertRule) -> crate::Result<()>;
    async fn get_alert_rule(&self, id: &str) -> crate::Result<Option<AlertRule>>;
    async fn list_alert_rules(&self) -> crate::Result<Vec<AlertRule>>;
    async fn list_enabled_rules_for_cluster(&self, cluster_name: &str) -> crate::Result<Vec<AlertRule>>;
    async fn delete_alert_rule(&self, id: &str) -> crate::Result<bool>;

    // Notifications
    async fn create_notification(&self, record: &NotificationRecord) -> crate::Result<()>;
    /// Writes the final state of a notification, inserting the row when the
    /// pending write never landed.
    async fn upsert_notification(&self, record: &NotificationRecord) -> crate::Result<()>;
    async fn list_notifications(&self, alert_id: &str) -> crate::Result<Vec<NotificationRecord>>;

    // Statistics
    async fn upsert_statistic(&self, delta: &StatisticsDelta) -> crate::Result<()>;
    async fn list_statistics(&self, filter: &StatisticsFilter) -> crate::Result<Vec<AlertStatistic>>;
    async fn count_firing_by_severity(&self, since: Option<DateTime<Utc>>, until: DateTime<Utc>) -> crate::Result<Vec<SeverityCount>>;
    async fn alert_trend(&self, since: DateTime<Utc>, bucket_format: &str) -> crate::Result<Vec<TrendPoint>>;
    async fn top_alert_names(&self, since: DateTime<Utc>, limit: i64) -> crate::Result<Vec<NamedCount>>;
    async fn count_by_cluster(&self, since: DateTime<Utc>) -> crate::Result<Vec<NamedCount>>;

    // Entity metadata
    async fn get_workload(&self, workload_id: &str) -> crate::Result<Option<WorkloadMeta>>;
    async fn get_pod(&self, pod_id: &str) -> crate::Result<Option<PodMeta>>;
    async fn get_node(&self, name: &str) -> crate::Result<Option<NodeMeta>>;
    async fn save_workload(&self, workload: &WorkloadMeta) -> crate::Result<()>;
    async fn save_pod(&self, pod: &PodMeta) -> crate::Result<()>;
    async fn save_node(&self, node: &NodeMeta) -> crate::Result<()>;
}
