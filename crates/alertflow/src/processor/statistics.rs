use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    alert::UnifiedAlert,
    dispatcher::TaskHandler,
    store::{StatPeriod, StatisticsDelta, StatisticsKey, Store},
};

#[derive(Debug, Clone)]
pub enum StatisticsUpdate {
    /// A newly stored alert. Counted as firing regardless of its status.
    Fired(UnifiedAlert),
    /// A stored alert that just resolved. `alert` carries the stored start time.
    Resolved {
        alert: UnifiedAlert,
        ends_at: DateTime<Utc>,
    },
}

impl StatisticsUpdate {
    pub fn alert(&self) -> &UnifiedAlert {
        match self {
            StatisticsUpdate::Fired(alert) => alert,
            StatisticsUpdate::Resolved { alert, .. } => alert,
        }
    }
}

fn bucket_key(alert: &UnifiedAlert, period: StatPeriod) -> StatisticsKey {
    StatisticsKey {
        date: alert.starts_at.date_naive(),
        hour: match period {
            StatPeriod::Hour => alert.starts_at.hour(),
            StatPeriod::Day => 0,
        },
        period,
        alert_name: alert.alert_name.clone(),
        source: alert.source,
        severity: alert.severity,
        workload_id: alert.workload_id.clone(),
        cluster_name: alert.cluster_name.clone(),
    }
}

/// Hourly and daily deltas for one update, both keyed by the alert's start.
pub fn deltas_for(update: &StatisticsUpdate) -> [StatisticsDelta; 2] {
    let (firing, resolved, duration_seconds) = match update {
        StatisticsUpdate::Fired(_) => (1, 0, 0.0),
        StatisticsUpdate::Resolved { alert, ends_at } => {
            let seconds = (*ends_at - alert.starts_at).num_seconds().max(0);
            (0, 1, seconds as f64)
        }
    };
    let alert = update.alert();
    [StatPeriod::Hour, StatPeriod::Day].map(|period| StatisticsDelta {
        key: bucket_key(alert, period),
        firing,
        resolved,
        duration_seconds,
    })
}

pub struct StatisticsRecorder {
    store: Arc<dyn Store>,
}

impl StatisticsRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TaskHandler<StatisticsUpdate> for StatisticsRecorder {
    async fn handle(&self, update: StatisticsUpdate) {
        let alert = update.alert();
        debug!("Recording statistics for alert {}", alert.id);
        for delta in deltas_for(&update) {
            if let Err(e) = self.store.upsert_statistic(&delta).await {
                error!(
                    "Failed to update {} statistics for alert {}: {}",
                    delta.key.period, alert.id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSource;
    use crate::store::{DatabaseConfig, SqliteStore, StatisticsFilter};
    use chrono::{NaiveDate, TimeZone};

    fn alert() -> UnifiedAlert {
        let mut alert = UnifiedAlert::new("a1", AlertSource::Metric, "GPUMemoryHigh");
        alert.starts_at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 0).unwrap();
        alert.cluster_name = "c1".to_string();
        alert
    }

    #[test]
    fn test_fired_update_counts_hour_and_day() {
        let [hour, day] = deltas_for(&StatisticsUpdate::Fired(alert()));
        assert_eq!(hour.key.hour, 13);
        assert_eq!(hour.key.period, StatPeriod::Hour);
        assert_eq!(day.key.hour, 0);
        assert_eq!(day.key.period, StatPeriod::Day);
        assert_eq!(day.key.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!((hour.firing, hour.resolved), (1, 0));
    }

    #[test]
    fn test_resolved_update_measures_whole_seconds() {
        let alert = alert();
        let ends_at = alert.starts_at + chrono::Duration::milliseconds(90_700);
        let [hour, _] = deltas_for(&StatisticsUpdate::Resolved { alert, ends_at });
        assert_eq!((hour.firing, hour.resolved), (0, 1));
        assert_eq!(hour.duration_seconds, 90.0);
    }

    #[test]
    fn test_resolution_before_start_clamps_to_zero() {
        let alert = alert();
        let ends_at = alert.starts_at - chrono::Duration::minutes(5);
        let [hour, _] = deltas_for(&StatisticsUpdate::Resolved { alert, ends_at });
        assert_eq!(hour.duration_seconds, 0.0);
    }

    #[tokio::test]
    async fn test_recorder_writes_both_buckets() {
        let store = SqliteStore::connect(&DatabaseConfig::in_memory()).await.unwrap();
        store.init().await.unwrap();
        let store: Arc<dyn Store> = Arc::new(store);

        let recorder = StatisticsRecorder::new(store.clone());
        recorder.handle(StatisticsUpdate::Fired(alert())).await;

        let rows = store
            .list_statistics(&StatisticsFilter { limit: 10, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.firing_count == 1));
    }
}
