use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{fingerprint_labels, lenient_string, lenient_string_map, parse_end_time, parse_time};
use crate::alert::{AlertSource, AlertStatus, Severity, UnifiedAlert};

/// One alert as sent by AlertManager-compatible rule engines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricAlertItem {
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(deserialize_with = "lenient_string_map")]
    pub labels: HashMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub annotations: HashMap<String, String>,
    #[serde(rename = "startsAt", deserialize_with = "lenient_string")]
    pub starts_at: String,
    #[serde(rename = "endsAt", deserialize_with = "lenient_string")]
    pub ends_at: String,
    #[serde(rename = "generatorURL", deserialize_with = "lenient_string")]
    pub generator_url: String,
    #[serde(deserialize_with = "lenient_string")]
    pub fingerprint: String,
}

/// Named-wrapper webhook body carrying shared labels and annotations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricWebhook {
    #[serde(deserialize_with = "lenient_string")]
    pub receiver: String,
    #[serde(deserialize_with = "lenient_string")]
    pub status: String,
    pub alerts: Vec<MetricAlertItem>,
    #[serde(rename = "groupLabels", deserialize_with = "lenient_string_map")]
    pub group_labels: HashMap<String, String>,
    #[serde(rename = "commonLabels", deserialize_with = "lenient_string_map")]
    pub common_labels: HashMap<String, String>,
    #[serde(rename = "commonAnnotations", deserialize_with = "lenient_string_map")]
    pub common_annotations: HashMap<String, String>,
    #[serde(rename = "externalURL", deserialize_with = "lenient_string")]
    pub external_url: String,
}

fn convert_item(
    item: &MetricAlertItem,
    common_labels: &HashMap<String, String>,
    common_annotations: &HashMap<String, String>,
) -> UnifiedAlert {
    let mut labels = item.labels.clone();
    for (k, v) in common_labels {
        labels.entry(k.clone()).or_insert_with(|| v.clone());
    }
    let mut annotations = item.annotations.clone();
    for (k, v) in common_annotations {
        annotations.entry(k.clone()).or_insert_with(|| v.clone());
    }

    let id = if item.fingerprint.trim().is_empty() {
        fingerprint_labels(&item.labels)
    } else {
        item.fingerprint.clone()
    };

    let label = |key: &str| labels.get(key).cloned().unwrap_or_default();

    let mut alert = UnifiedAlert::new(id, AlertSource::Metric, label("alertname"));
    alert.severity = Severity::parse_or(&label("severity"), Severity::Warning);
    alert.status = AlertStatus::parse_or(&item.status, AlertStatus::Firing);
    alert.starts_at = parse_time(&item.starts_at);
    alert.ends_at = parse_end_time(&item.ends_at);
    alert.workload_id = label("workload_id");
    alert.pod_name = label("pod");
    alert.pod_id = label("pod_id");
    alert.node_name = label("node");
    alert.cluster_name = label("cluster");
    alert.raw_data = serde_json::to_value(item).unwrap_or_default();
    alert.labels = labels;
    alert.annotations = annotations;
    alert
}

/// Converts the named-wrapper variant. Item-level keys win over common ones.
pub fn convert_metric_webhook(webhook: &MetricWebhook) -> Vec<UnifiedAlert> {
    webhook
        .alerts
        .iter()
        .map(|item| convert_item(item, &webhook.common_labels, &webhook.common_annotations))
        .collect()
}

/// Converts a bare AlertManager array.
pub fn convert_alertmanager_items(items: &[MetricAlertItem]) -> Vec<UnifiedAlert> {
    let empty = HashMap::new();
    items.iter().map(|item| convert_item(item, &empty, &empty)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_named_wrapper_merges_common_labels_without_overriding() {
        let webhook: MetricWebhook = serde_json::from_value(json!({
            "alerts": [{
                "status": "firing",
                "labels": {
                    "alertname": "GPUMemoryHigh",
                    "severity": "critical",
                    "workload_id": "wl-1",
                    "pod": "trainer-0",
                    "node": "gpu-node-1",
                    "cluster": "item-cluster"
                },
                "annotations": {"summary": "item summary"},
                "startsAt": "2024-05-01T10:00:00Z",
                "endsAt": "0001-01-01T00:00:00Z",
                "fingerprint": "abc123"
            }],
            "commonLabels": {"cluster": "common-cluster", "team": "ml"},
            "commonAnnotations": {"summary": "common summary", "runbook": "http://runbook"}
        }))
        .unwrap();

        let alerts = convert_metric_webhook(&webhook);
        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.id, "abc123");
        assert_eq!(alert.alert_name, "GPUMemoryHigh");
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.ends_at, None);
        assert_eq!(alert.cluster_name, "item-cluster");
        assert_eq!(alert.labels["cluster"], "item-cluster");
        assert_eq!(alert.labels["team"], "ml");
        assert_eq!(alert.annotations["summary"], "item summary");
        assert_eq!(alert.annotations["runbook"], "http://runbook");
        assert_eq!(alert.workload_id, "wl-1");
        assert_eq!(alert.pod_name, "trainer-0");
        assert_eq!(alert.node_name, "gpu-node-1");
    }

    #[test]
    fn test_alertmanager_items_default_fingerprint_and_status() {
        let items: Vec<MetricAlertItem> = serde_json::from_value(json!([{
            "labels": {"alertname": "NodeDown", "node": "n1"},
            "startsAt": "2024-05-01T10:00:00Z",
            "endsAt": "2024-05-01T10:30:00Z"
        }]))
        .unwrap();

        let alerts = convert_alertmanager_items(&items);
        let alert = &alerts[0];
        assert_eq!(alert.status, AlertStatus::Firing);
        assert_eq!(alert.id, fingerprint_labels(&items[0].labels));
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.ends_at.unwrap().to_rfc3339(), "2024-05-01T10:30:00+00:00");
    }

    #[test]
    fn test_resolved_status_and_lenient_fields() {
        let items: Vec<MetricAlertItem> = serde_json::from_value(json!([{
            "status": "resolved",
            "labels": {"alertname": "DiskSpaceLow", "gpu": 3},
            "startsAt": 12345,
            "fingerprint": "fp-1"
        }]))
        .unwrap();

        let alert = &convert_alertmanager_items(&items)[0];
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.labels["gpu"], "3");
    }
}
