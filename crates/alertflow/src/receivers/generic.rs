use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::object_to_string_map;
use crate::alert::{AlertSource, AlertStatus, Severity, UnifiedAlert};

const DEFAULT_ALERT_NAME: &str = "generic_webhook_alert";

fn string_field<'a>(data: &'a JsonValue, key: &str) -> Option<&'a str> {
    data.get(key).and_then(JsonValue::as_str)
}

/// Converts an arbitrary JSON body. Each delivery gets a fresh id, so these
/// alerts are never deduplicated.
pub fn convert_generic_webhook(data: &JsonValue) -> UnifiedAlert {
    let alert_name = string_field(data, "alert_name").unwrap_or(DEFAULT_ALERT_NAME);

    let mut alert = UnifiedAlert::new(Uuid::new_v4().to_string(), AlertSource::Webhook, alert_name);
    alert.severity = string_field(data, "severity")
        .map(|s| Severity::parse_or(s, Severity::Info))
        .unwrap_or(Severity::Info);
    alert.status = string_field(data, "status")
        .map(|s| AlertStatus::parse_or(s, AlertStatus::Firing))
        .unwrap_or(AlertStatus::Firing);
    if let Some(labels) = data.get("labels") {
        alert.labels = object_to_string_map(labels);
    }
    if let Some(annotations) = data.get("annotations") {
        alert.annotations = object_to_string_map(annotations);
    }
    alert.raw_data = data.clone();
    alert
}
