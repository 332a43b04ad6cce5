use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    alert::UnifiedAlert,
    notifier::ChannelConfig,
    processor::full_regex_match,
    store::{AlertRule, Store},
    Result,
};

/// Label predicate on a route. An absent label compares as the empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteMatcher {
    pub name: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
}

impl RouteMatcher {
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        let actual = labels.get(&self.name).map(String::as_str).unwrap_or_default();
        if self.is_regex {
            full_regex_match(&self.value, actual)
        } else {
            actual == self.value
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub matchers: Vec<RouteMatcher>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_wait: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<String>,
}

impl RouteConfig {
    pub fn matches(&self, alert: &UnifiedAlert) -> bool {
        self.matchers.iter().all(|m| m.matches(&alert.labels))
    }
}

/// Route used when no configured rule applies.
pub fn default_route(webhook_url: &str) -> RouteConfig {
    RouteConfig {
        channels: vec![ChannelConfig::webhook(webhook_url)],
        ..Default::default()
    }
}

fn rule_route(rule: &AlertRule, alert: &UnifiedAlert) -> Option<RouteConfig> {
    if alert.alert_name.is_empty() || !rule.alert_group.contains(&alert.alert_name) {
        return None;
    }
    if rule.route_config.is_null() {
        return None;
    }
    match serde_json::from_value::<RouteConfig>(rule.route_config.clone()) {
        Ok(route) if route.matches(alert) => Some(route),
        Ok(_) => {
            debug!("Rule {} route matchers exclude alert {}", rule.id, alert.id);
            None
        }
        Err(e) => {
            warn!("Skipping rule {} with invalid route config: {}", rule.id, e);
            None
        }
    }
}

pub struct Router {
    store: Arc<dyn Store>,
}

impl Router {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Routes from enabled rules in the alert's cluster that mention the
    /// alert by name. Rules are read on every call.
    pub async fn routes_for_alert(&self, alert: &UnifiedAlert) -> Result<Vec<RouteConfig>> {
        let rules = self.store.list_enabled_rules_for_cluster(&alert.cluster_name).await?;
        let routes: Vec<RouteConfig> = rules.iter().filter_map(|rule| rule_route(rule, alert)).collect();
        debug!(
            "Alert {} matched {} routes from {} rules",
            alert.id,
            routes.len(),
            rules.len()
        );
        Ok(routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSource;
    use crate::store::{DatabaseConfig, SqliteStore};
    use chrono::Utc;
    use serde_json::json;

    fn rule(id: &str, cluster: &str, group: &str, route: serde_json::Value) -> AlertRule {
        let now = Utc::now();
        AlertRule {
            id: id.to_string(),
            name: id.to_string(),
            cluster_name: cluster.to_string(),
            enabled: true,
            alert_group: group.to_string(),
            route_config: route,
            created_at: now,
            updated_at: now,
        }
    }

    fn alert() -> UnifiedAlert {
        let mut alert = UnifiedAlert::new("a1", AlertSource::Metric, "GPUMemoryHigh");
        alert.cluster_name = "c1".to_string();
        alert.labels.insert("team".to_string(), "ml-infra".to_string());
        alert
    }

    #[test]
    fn test_route_matchers_equality_and_regex() {
        let labels: HashMap<String, String> = [("team".to_string(), "ml-infra".to_string())].into();
        let eq = RouteMatcher { name: "team".into(), value: "ml-infra".into(), is_regex: false };
        let re = RouteMatcher { name: "team".into(), value: "ml-.*".into(), is_regex: true };
        let partial = RouteMatcher { name: "team".into(), value: "ml".into(), is_regex: true };
        let absent = RouteMatcher { name: "env".into(), value: "".into(), is_regex: false };
        assert!(eq.matches(&labels));
        assert!(re.matches(&labels));
        assert!(!partial.matches(&labels));
        assert!(absent.matches(&labels));
    }

    #[test]
    fn test_default_route_is_single_webhook() {
        let route = default_route("http://fallback.local/hook");
        assert_eq!(route.channels, vec![ChannelConfig::webhook("http://fallback.local/hook")]);
        assert!(route.matchers.is_empty());
    }

    #[tokio::test]
    async fn test_routes_filter_by_cluster_group_and_matchers() {
        let store = SqliteStore::connect(&DatabaseConfig::in_memory()).await.unwrap();
        store.init().await.unwrap();
        let store: Arc<dyn Store> = Arc::new(store);

        let hook = |url: &str| json!({"channels": [{"type": "webhook", "config": {"url": url}}]});
        store
            .save_alert_rule(&rule("global", "", "groups: [GPUMemoryHigh, OOMError]", hook("http://a")))
            .await
            .unwrap();
        store
            .save_alert_rule(&rule("other-cluster", "c2", "GPUMemoryHigh", hook("http://b")))
            .await
            .unwrap();
        store
            .save_alert_rule(&rule("other-alert", "c1", "NodeDown", hook("http://c")))
            .await
            .unwrap();
        store
            .save_alert_rule(&rule(
                "matcher-miss",
                "c1",
                "GPUMemoryHigh",
                json!({
                    "matchers": [{"name": "team", "value": "storage"}],
                    "channels": [{"type": "webhook", "config": {"url": "http://d"}}]
                }),
            ))
            .await
            .unwrap();
        let mut disabled = rule("disabled", "c1", "GPUMemoryHigh", hook("http://e"));
        disabled.enabled = false;
        store.save_alert_rule(&disabled).await.unwrap();

        let routes = Router::new(store).routes_for_alert(&alert()).await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].channels, vec![ChannelConfig::webhook("http://a")]);
    }
}
