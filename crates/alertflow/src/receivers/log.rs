use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{fingerprint_parts, lenient_string, lenient_string_map, parse_time};
use crate::alert::{AlertSource, AlertStatus, Severity, UnifiedAlert};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogAlertRequest {
    #[serde(deserialize_with = "lenient_string")]
    pub rule_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub severity: String,
    #[serde(deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pattern: String,
    #[serde(deserialize_with = "lenient_string")]
    pub workload_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pod_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pod_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub node_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub log_time: String,
    #[serde(deserialize_with = "lenient_string_map")]
    pub labels: HashMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub annotations: HashMap<String, String>,
}

pub fn convert_log_alert(req: &LogAlertRequest) -> UnifiedAlert {
    let id = fingerprint_parts(&[&req.rule_name, &req.workload_id, &req.pod_name, &req.pattern]);

    let mut alert = UnifiedAlert::new(id, AlertSource::Log, req.rule_name.clone());
    alert.severity = Severity::parse_or(&req.severity, Severity::Warning);
    alert.status = AlertStatus::Firing;
    alert.starts_at = parse_time(&req.log_time);

    alert.labels = req.labels.clone();
    alert.labels.insert("alertname".to_string(), req.rule_name.clone());
    alert.labels.insert("pattern".to_string(), req.pattern.clone());
    alert.annotations = req.annotations.clone();
    alert.annotations.insert("message".to_string(), req.message.clone());

    alert.workload_id = req.workload_id.clone();
    alert.pod_name = req.pod_name.clone();
    alert.pod_id = req.pod_id.clone();
    alert.node_name = req.node_name.clone();
    alert.raw_data = serde_json::to_value(req).unwrap_or_default();
    alert
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_alert_fingerprint_and_labels() {
        let req: LogAlertRequest = serde_json::from_value(json!({
            "rule_name": "OOMError",
            "severity": "high",
            "message": "CUDA out of memory",
            "pattern": "out of memory",
            "workload_id": "wl-1",
            "pod_name": "trainer-0",
            "log_time": "2024-05-01T10:00:30Z",
            "labels": {"team": "ml"}
        }))
        .unwrap();

        let alert = convert_log_alert(&req);
        assert_eq!(
            alert.id,
            fingerprint_parts(&["OOMError", "wl-1", "trainer-0", "out of memory"])
        );
        assert_eq!(alert.source, AlertSource::Log);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.status, AlertStatus::Firing);
        assert_eq!(alert.labels["alertname"], "OOMError");
        assert_eq!(alert.labels["pattern"], "out of memory");
        assert_eq!(alert.labels["team"], "ml");
        assert_eq!(alert.annotations["message"], "CUDA out of memory");
        assert_eq!(alert.starts_at.to_rfc3339(), "2024-05-01T10:00:30+00:00");
    }

    #[test]
    fn test_same_request_yields_same_id() {
        let req = LogAlertRequest {
            rule_name: "NCCLError".to_string(),
            pattern: "NCCL WARN".to_string(),
            ..Default::default()
        };
        assert_eq!(convert_log_alert(&req).id, convert_log_alert(&req).id);
    }
}
