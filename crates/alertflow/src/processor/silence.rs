use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    alert::UnifiedAlert,
    store::{LabelMatcher, MatchOperator, Silence, SilenceType, SilencedAlert, Store},
    Result,
};

fn anchored_regex(pattern: &str) -> Option<Regex> {
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Ignoring invalid matcher pattern {:?}: {}", pattern, e);
            None
        }
    }
}

/// Anchored regex match in the Prometheus style. Invalid patterns never match.
pub fn full_regex_match(pattern: &str, value: &str) -> bool {
    anchored_regex(pattern).map_or(false, |re| re.is_match(value))
}

fn label_matcher_matches(matcher: &LabelMatcher, labels: &HashMap<String, String>) -> bool {
    let Some(value) = labels.get(&matcher.key) else {
        return false;
    };
    match matcher.operator {
        MatchOperator::Equal => *value == matcher.value,
        MatchOperator::NotEqual => *value != matcher.value,
        MatchOperator::Regex => full_regex_match(&matcher.value, value),
        MatchOperator::NotRegex => anchored_regex(&matcher.value).map_or(false, |re| !re.is_match(value)),
    }
}

fn resource_matches(alert: &UnifiedAlert, resource_type: &str, resource_name: &str) -> bool {
    let field = match resource_type {
        "node" => &alert.node_name,
        "pod" => &alert.pod_name,
        "workload" => &alert.workload_id,
        _ => return false,
    };
    !field.is_empty() && field == resource_name
}

/// Whether `silence` applies to `alert`, ignoring its time window.
pub fn silence_matches(alert: &UnifiedAlert, silence: &Silence) -> bool {
    if !silence.enabled {
        return false;
    }
    if !silence.cluster_name.is_empty() && silence.cluster_name != alert.cluster_name {
        return false;
    }

    match silence.silence_type {
        SilenceType::Label => {
            !silence.label_matchers.is_empty()
                && silence
                    .label_matchers
                    .iter()
                    .all(|m| label_matcher_matches(m, &alert.labels))
        }
        SilenceType::AlertName => silence.alert_names.iter().any(|n| *n == alert.alert_name),
        SilenceType::Resource => silence
            .resource_filters
            .iter()
            .any(|f| resource_matches(alert, &f.resource_type, &f.resource_name)),
        // Expression silences are stored but not evaluated.
        SilenceType::Expression => false,
    }
}

pub struct SilenceMatcher {
    store: Arc<dyn Store>,
}

impl SilenceMatcher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the first active silence covering the alert.
    pub async fn find_silence(&self, alert: &UnifiedAlert) -> Result<Option<Silence>> {
        let silences = self.store.list_active_silences(Utc::now()).await?;
        debug!("Checking alert {} against {} active silences", alert.id, silences.len());
        Ok(silences.into_iter().find(|s| silence_matches(alert, s)))
    }

    /// Appends an audit row for a suppressed alert.
    pub async fn record(&self, silence: &Silence, alert: &UnifiedAlert) -> Result<()> {
        let record = SilencedAlert {
            silence_id: silence.id.clone(),
            alert_id: alert.id.clone(),
            alert_name: alert.alert_name.clone(),
            cluster_name: alert.cluster_name.clone(),
            silenced_at: Utc::now(),
            reason: silence.reason.clone(),
            alert_data: serde_json::to_value(alert)?,
        };
        self.store.record_silenced_alert(&record).await
    }
}
