//! Wire formats accepted by the ingestion endpoints and their conversion to
//! [`UnifiedAlert`](crate::alert::UnifiedAlert).
//!
//! Conversion never fails on field shape: values of the wrong JSON type are
//! coerced to strings or replaced by defaults.

mod fingerprint;
mod generic;
mod log;
mod metric;
mod trace;

pub use fingerprint::{fingerprint_labels, fingerprint_parts};
pub use generic::convert_generic_webhook;
pub use log::{convert_log_alert, LogAlertRequest};
pub use metric::{convert_alertmanager_items, convert_metric_webhook, MetricAlertItem, MetricWebhook};
pub use trace::{convert_trace_alert, TraceAlertRequest};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// End-time value some senders use to mean "not ended".
pub const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

/// Parses an RFC 3339 timestamp, falling back to the current time.
pub fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parses an optional end time. Blanks, the zero sentinel and unparseable
/// values are all treated as absent.
pub fn parse_end_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() || value == ZERO_TIME {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub(crate) fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

pub(crate) fn object_to_string_map(value: &JsonValue) -> HashMap<String, String> {
    match value {
        JsonValue::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect(),
        _ => HashMap::new(),
    }
}

pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

pub(crate) fn lenient_string_map<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(object_to_string_map(&value))
}

pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = JsonValue::deserialize(deserializer)?;
    Ok(match value {
        JsonValue::Number(n) => n.as_f64().unwrap_or_default(),
        JsonValue::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_end_time_skips_sentinel() {
        assert_eq!(parse_end_time(ZERO_TIME), None);
        assert_eq!(parse_end_time(""), None);
        assert_eq!(parse_end_time("yesterday"), None);
        let parsed = parse_end_time("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_parse_time_falls_back_to_now() {
        let before = Utc::now();
        let parsed = parse_time("yesterday-ish");
        assert!(parsed >= before);
    }

    #[test]
    fn test_object_to_string_map_stringifies_values() {
        let map = object_to_string_map(&json!({"a": "x", "b": 3, "c": true, "d": null}));
        assert_eq!(map["a"], "x");
        assert_eq!(map["b"], "3");
        assert_eq!(map["c"], "true");
        assert_eq!(map["d"], "");
        assert!(object_to_string_map(&json!(["not", "an", "object"])).is_empty());
    }
}
