//! Links a newly stored alert to recent firing alerts that share a time
//! window, an entity, a source boundary or a known cause/effect relation.

mod rules;

pub use rules::{CausalIndex, CausalRule, DEFAULT_CAUSAL_RULES};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    alert::UnifiedAlert,
    dispatcher::TaskHandler,
    metrics,
    store::{CandidateQuery, CorrelationRecord, CorrelationType, EntityKey, Store},
    Result,
};

const CANDIDATE_WINDOW_MINUTES: i64 = 5;
const CANDIDATE_LIMIT: i64 = 100;
pub const SCORE_THRESHOLD: f64 = 0.3;

/// Result of comparing two alerts.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationScore {
    pub score: f64,
    pub correlation_type: Option<CorrelationType>,
    pub reason: String,
}

/// A stored correlation group seen from one of its members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationGroup {
    pub correlation_id: String,
    pub alerts: Vec<UnifiedAlert>,
    pub correlation_type: CorrelationType,
    pub correlation_score: f64,
    pub reason: String,
}

/// Scores how strongly `related` is connected to `alert`.
pub fn score_pair(causal: &CausalIndex, alert: &UnifiedAlert, related: &UnifiedAlert) -> CorrelationScore {
    let mut score = 0.0;
    let mut reasons = Vec::new();
    let mut correlation_type = None;

    let delta_ms = (alert.starts_at - related.starts_at).num_milliseconds().abs();
    let time_related = if delta_ms < Duration::minutes(1).num_milliseconds() {
        score += 0.4;
        reasons.push("fired within 1 minute".to_string());
        true
    } else if delta_ms < Duration::minutes(CANDIDATE_WINDOW_MINUTES).num_milliseconds() {
        score += 0.2;
        reasons.push("fired within 5 minutes".to_string());
        true
    } else {
        false
    };

    let same = |a: &str, b: &str| !a.is_empty() && a == b;
    let entity_related = if same(&alert.workload_id, &related.workload_id) {
        score += 0.5;
        reasons.push(format!("same workload {}", alert.workload_id));
        true
    } else if same(&alert.pod_name, &related.pod_name) {
        score += 0.4;
        reasons.push(format!("same pod {}", alert.pod_name));
        true
    } else if same(&alert.node_name, &related.node_name) {
        score += 0.3;
        reasons.push(format!("same node {}", alert.node_name));
        true
    } else {
        false
    };

    let cross_source = alert.source != related.source;
    if cross_source {
        score += 0.3;
        reasons.push(format!("cross-source ({} and {})", alert.source, related.source));
    }

    let causal_score = match causal.lookup(&alert.alert_name, &related.alert_name) {
        Some(rule) => {
            score += rule.score;
            reasons.push(format!("causal: {}", rule.description));
            rule.score
        }
        None => 0.0,
    };

    if causal_score > 0.3 {
        correlation_type = Some(CorrelationType::Causal);
    } else if entity_related {
        correlation_type = Some(CorrelationType::Entity);
    } else if time_related {
        correlation_type = Some(CorrelationType::Time);
    }
    if cross_source && correlation_type != Some(CorrelationType::Causal) {
        correlation_type = Some(CorrelationType::CrossSource);
    }

    CorrelationScore {
        score,
        correlation_type,
        reason: reasons.join("; "),
    }
}

fn entity_key(alert: &UnifiedAlert) -> Option<EntityKey> {
    if !alert.workload_id.is_empty() {
        Some(EntityKey::Workload(alert.workload_id.clone()))
    } else if !alert.pod_name.is_empty() {
        Some(EntityKey::Pod(alert.pod_name.clone()))
    } else if !alert.node_name.is_empty() {
        Some(EntityKey::Node(alert.node_name.clone()))
    } else {
        None
    }
}

pub struct Correlator {
    store: Arc<dyn Store>,
    causal: CausalIndex,
}

impl Correlator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_rules(store, CausalIndex::with_defaults())
    }

    pub fn with_rules(store: Arc<dyn Store>, causal: CausalIndex) -> Self {
        Self { store, causal }
    }

    /// Scores recent candidates and stores the ones above threshold under a
    /// single correlation id. Returns the rows written.
    pub async fn correlate(&self, alert: &UnifiedAlert) -> Result<Vec<CorrelationRecord>> {
        let window = Duration::minutes(CANDIDATE_WINDOW_MINUTES);
        let query = CandidateQuery {
            exclude_id: alert.id.clone(),
            window_start: alert.starts_at - window,
            window_end: alert.starts_at + window,
            entity: entity_key(alert),
            limit: CANDIDATE_LIMIT,
        };
        let candidates = self.store.find_correlation_candidates(&query).await?;
        debug!("Alert {} has {} correlation candidates", alert.id, candidates.len());

        let correlation_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let records: Vec<CorrelationRecord> = candidates
            .into_iter()
            .filter_map(|event| {
                let related = event.alert;
                let scored = score_pair(&self.causal, alert, &related);
                if scored.score < SCORE_THRESHOLD {
                    return None;
                }
                let correlation_type = scored.correlation_type?;
                Some(CorrelationRecord {
                    correlation_id: correlation_id.clone(),
                    alert_id: alert.id.clone(),
                    related_alert_id: related.id.clone(),
                    correlation_type,
                    correlation_score: scored.score,
                    correlation_reason: scored.reason,
                    correlation_metadata: json!({
                        "alert_name": alert.alert_name,
                        "related_alert_name": related.alert_name,
                        "time_diff_seconds": (alert.starts_at - related.starts_at).num_seconds().abs(),
                    }),
                    created_at: now,
                })
            })
            .collect();

        if records.is_empty() {
            return Ok(records);
        }
        self.store.save_correlations(&records).await?;
        metrics::record_correlations(records.len());
        info!(
            "Correlated alert {} with {} alerts ({})",
            alert.id,
            records.len(),
            correlation_id
        );
        Ok(records)
    }

    /// Every correlation group the alert belongs to, with member alerts
    /// resolved to their stored state.
    pub async fn get_alert_correlations(&self, alert_id: &str) -> Result<Vec<CorrelationGroup>> {
        let rows = self.store.list_correlations_for_alert(alert_id).await?;

        let mut group_ids = Vec::new();
        let mut seen = BTreeSet::new();
        for row in &rows {
            if seen.insert(row.correlation_id.clone()) {
                group_ids.push(row.correlation_id.clone());
            }
        }

        let mut groups = Vec::with_capacity(group_ids.len());
        for correlation_id in group_ids {
            let members = self.store.list_correlation_group(&correlation_id).await?;
            let Some(first) = members.first() else {
                continue;
            };

            let ids: Vec<String> = members
                .iter()
                .flat_map(|m| [m.alert_id.clone(), m.related_alert_id.clone()])
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let alerts = self
                .store
                .get_alert_events(&ids)
                .await?
                .into_iter()
                .map(UnifiedAlert::from)
                .collect();

            groups.push(CorrelationGroup {
                correlation_id: correlation_id.clone(),
                alerts,
                correlation_type: first.correlation_type,
                correlation_score: first.correlation_score,
                reason: first.correlation_reason.clone(),
            });
        }
        Ok(groups)
    }
}

#[async_trait]
impl TaskHandler<UnifiedAlert> for Correlator {
    async fn handle(&self, alert: UnifiedAlert) {
        match self.correlate(&alert).await {
            Ok(records) if records.is_empty() => debug!("No correlations for alert {}", alert.id),
            Ok(_) => {}
            Err(e) => error!("Correlation failed for alert {}: {}", alert.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSource;
    use crate::store::{DatabaseConfig, SqliteStore};
    use chrono::{DateTime, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn alert(id: &str, source: AlertSource, name: &str, offset_secs: i64) -> UnifiedAlert {
        let mut alert = UnifiedAlert::new(id, source, name);
        alert.starts_at = base_time() + Duration::seconds(offset_secs);
        alert
    }

    fn with_workload(mut alert: UnifiedAlert, workload: &str) -> UnifiedAlert {
        alert.workload_id = workload.to_string();
        alert
    }

    #[test]
    fn test_causal_pair_scores_highest() {
        let causal = CausalIndex::with_defaults();
        let a = with_workload(alert("a1", AlertSource::Metric, "GPUMemoryHigh", 0), "wl-1");
        let b = with_workload(alert("a2", AlertSource::Log, "OOMError", 30), "wl-1");

        let scored = score_pair(&causal, &a, &b);
        assert!(scored.score >= 1.5 && scored.score <= 2.5, "score {}", scored.score);
        assert_eq!(scored.correlation_type, Some(CorrelationType::Causal));
        assert!(scored.reason.contains("high GPU memory leads to OOM"));

        let later = with_workload(alert("a3", AlertSource::Log, "OOMError", 180), "wl-1");
        let scored = score_pair(&causal, &a, &later);
        assert!(scored.score >= 1.5);
        assert_eq!(scored.correlation_type, Some(CorrelationType::Causal));
    }

    #[test]
    fn test_cross_source_overrides_entity_and_time() {
        let causal = CausalIndex::with_defaults();
        let a = with_workload(alert("a1", AlertSource::Metric, "GPUUtilizationLow", 0), "wl-1");
        let b = with_workload(alert("a2", AlertSource::Log, "TrainingSlowdown", 120), "wl-1");
        let scored = score_pair(&causal, &a, &b);
        assert!((scored.score - 1.0).abs() < 1e-9);
        assert_eq!(scored.correlation_type, Some(CorrelationType::CrossSource));

        let mut pod_a = alert("a1", AlertSource::Metric, "HighMemoryUsage", 0);
        pod_a.pod_name = "worker-0".to_string();
        let mut pod_b = alert("a2", AlertSource::Log, "ContainerRestart", 60);
        pod_b.pod_name = "worker-0".to_string();
        let scored = score_pair(&causal, &pod_a, &pod_b);
        assert!((scored.score - 0.9).abs() < 1e-9);
        assert_eq!(scored.correlation_type, Some(CorrelationType::CrossSource));

        let c = alert("a1", AlertSource::Metric, "HighLatency", 0);
        let d = alert("a2", AlertSource::Trace, "SlowOperation", 60);
        let scored = score_pair(&causal, &c, &d);
        assert!(scored.score >= 0.3 && scored.score <= 0.8);
        assert_eq!(scored.correlation_type, Some(CorrelationType::CrossSource));
    }

    #[test]
    fn test_same_source_entity_pair_is_entity_typed() {
        let causal = CausalIndex::with_defaults();
        let mut a = alert("a1", AlertSource::Metric, "NodeDiskPressure", 0);
        a.node_name = "gpu-node-01".to_string();
        let mut b = alert("a2", AlertSource::Metric, "DiskWriteSlow", 30);
        b.node_name = "gpu-node-01".to_string();

        let scored = score_pair(&causal, &a, &b);
        assert!((scored.score - 0.7).abs() < 1e-9);
        assert_eq!(scored.correlation_type, Some(CorrelationType::Entity));
        assert_eq!(scored.reason, "fired within 1 minute; same node gpu-node-01");
    }

    #[test]
    fn test_unrelated_alerts_do_not_correlate() {
        let causal = CausalIndex::with_defaults();
        let a = alert("a1", AlertSource::Metric, "Alert1", 0);
        let b = alert("a2", AlertSource::Metric, "Alert2", 600);
        let scored = score_pair(&causal, &a, &b);
        assert_eq!(scored.score, 0.0);
        assert_eq!(scored.correlation_type, None);
        assert!(scored.reason.is_empty());
    }

    async fn store() -> Arc<dyn Store> {
        let store = SqliteStore::connect(&DatabaseConfig::in_memory()).await.unwrap();
        store.init().await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_correlate_persists_group_and_reads_it_back() {
        let store = store().await;
        let first = with_workload(alert("a1", AlertSource::Metric, "GPUMemoryHigh", 0), "wl-1");
        let second = with_workload(alert("a2", AlertSource::Log, "OOMError", 30), "wl-1");
        store.insert_alert_event(&first).await.unwrap();
        store.insert_alert_event(&second).await.unwrap();

        let correlator = Correlator::new(store.clone());
        let records = correlator.correlate(&second).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].related_alert_id, "a1");
        assert_eq!(records[0].correlation_type, CorrelationType::Causal);

        let groups = correlator.get_alert_correlations("a1").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].correlation_id, records[0].correlation_id);
        assert_eq!(groups[0].correlation_type, CorrelationType::Causal);
        let mut ids: Vec<_> = groups[0].alerts.iter().map(|a| a.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn test_correlate_writes_nothing_for_distant_alerts() {
        let store = store().await;
        let old = alert("a1", AlertSource::Metric, "Alert1", 0);
        let new = alert("a2", AlertSource::Metric, "Alert2", 600);
        store.insert_alert_event(&old).await.unwrap();
        store.insert_alert_event(&new).await.unwrap();

        let correlator = Correlator::new(store.clone());
        assert!(correlator.correlate(&new).await.unwrap().is_empty());
        assert!(store.list_correlations_for_alert("a2").await.unwrap().is_empty());
    }
}
