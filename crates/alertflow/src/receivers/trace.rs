use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{fingerprint_parts, lenient_f64, lenient_string, lenient_string_map};
use crate::alert::{AlertSource, AlertStatus, Severity, UnifiedAlert};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceAlertRequest {
    #[serde(deserialize_with = "lenient_string")]
    pub rule_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub severity: String,
    #[serde(deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(deserialize_with = "lenient_string")]
    pub trace_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub span_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub service_name: String,
    #[serde(deserialize_with = "lenient_string")]
    pub operation: String,
    /// Span duration in milliseconds.
    #[serde(deserialize_with = "lenient_f64")]
    pub duration: f64,
    #[serde(deserialize_with = "lenient_string")]
    pub workload_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub pod_name: String,
    #[serde(deserialize_with = "lenient_string_map")]
    pub labels: HashMap<String, String>,
    #[serde(deserialize_with = "lenient_string_map")]
    pub annotations: HashMap<String, String>,
}

pub fn convert_trace_alert(req: &TraceAlertRequest) -> UnifiedAlert {
    let id = fingerprint_parts(&[&req.rule_name, &req.trace_id, &req.service_name, &req.operation]);

    let mut alert = UnifiedAlert::new(id, AlertSource::Trace, req.rule_name.clone());
    alert.severity = Severity::parse_or(&req.severity, Severity::Warning);
    alert.status = AlertStatus::Firing;
    alert.starts_at = Utc::now();

    alert.labels = req.labels.clone();
    for (key, value) in [
        ("alertname", &req.rule_name),
        ("trace_id", &req.trace_id),
        ("span_id", &req.span_id),
        ("service_name", &req.service_name),
        ("operation", &req.operation),
    ] {
        alert.labels.insert(key.to_string(), value.clone());
    }
    alert.annotations = req.annotations.clone();
    alert.annotations.insert("message".to_string(), req.message.clone());
    alert.annotations.insert("duration".to_string(), format!("{:.2}ms", req.duration));

    alert.workload_id = req.workload_id.clone();
    alert.pod_name = req.pod_name.clone();
    alert.raw_data = serde_json::to_value(req).unwrap_or_default();
    alert
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trace_alert_labels_and_duration() {
        let req: TraceAlertRequest = serde_json::from_value(json!({
            "rule_name": "SlowAllReduce",
            "severity": "warning",
            "message": "allreduce exceeded budget",
            "trace_id": "t-1",
            "span_id": "s-9",
            "service_name": "trainer",
            "operation": "allreduce",
            "duration": 1234.5678,
            "workload_id": "wl-1"
        }))
        .unwrap();

        let alert = convert_trace_alert(&req);
        assert_eq!(
            alert.id,
            fingerprint_parts(&["SlowAllReduce", "t-1", "trainer", "allreduce"])
        );
        assert_eq!(alert.source, AlertSource::Trace);
        assert_eq!(alert.labels["trace_id"], "t-1");
        assert_eq!(alert.labels["span_id"], "s-9");
        assert_eq!(alert.labels["service_name"], "trainer");
        assert_eq!(alert.labels["operation"], "allreduce");
        assert_eq!(alert.annotations["duration"], "1234.57ms");
        assert_eq!(alert.workload_id, "wl-1");
    }

    #[test]
    fn test_duration_accepts_string_numbers() {
        let req: TraceAlertRequest =
            serde_json::from_value(json!({"rule_name": "x", "duration": "12"})).unwrap();
        assert_eq!(convert_trace_alert(&req).annotations["duration"], "12.00ms");
    }
}
