use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use http::StatusCode;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{ApiError, Server};
use crate::{
    alert::{AlertSource, AlertStatus, Severity},
    metrics,
    router::RouteConfig,
    store::{
        AlertFilter, AlertRule, LabelMatcher, ResourceFilter, Silence, SilenceType, StatPeriod,
        StatisticsFilter,
    },
};

type ApiResult<T = Json<JsonValue>> = std::result::Result<T, ApiError>;

const DEFAULT_LIST_LIMIT: i64 = 50;
const DEFAULT_STATISTICS_LIMIT: i64 = 100;
const DEFAULT_WINDOW_HOURS: i64 = 24;
const DEFAULT_TOP_LIMIT: i64 = 10;

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "healthy" }))
}

pub async fn get_metrics() -> ApiResult<String> {
    Ok(metrics::gather_metrics()?)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AlertQuery {
    pub source: Option<AlertSource>,
    pub alert_name: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<AlertStatus>,
    pub workload_id: Option<String>,
    pub pod_name: Option<String>,
    pub node_name: Option<String>,
    pub cluster: Option<String>,
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub async fn list_alerts(
    State(server): State<Arc<Server>>,
    query: Result<Query<AlertQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);

    let filter = AlertFilter {
        source: query.source,
        alert_name: non_empty(query.alert_name),
        severity: query.severity,
        status: query.status,
        workload_id: non_empty(query.workload_id),
        pod_name: non_empty(query.pod_name),
        node_name: non_empty(query.node_name),
        cluster_name: non_empty(query.cluster),
        starts_after: query.starts_after,
        starts_before: query.starts_before,
        limit,
        offset,
    };
    let alerts = server.store.list_alert_events(&filter).await?;

    Ok(Json(json!({
        "alerts": alerts,
        "total": alerts.len(),
        "offset": offset,
        "limit": limit,
    })))
}

pub async fn get_alert(State(server): State<Arc<Server>>, Path(id): Path<String>) -> ApiResult {
    let event = server
        .store
        .get_alert_event(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("alert not found"))?;
    Ok(Json(json!(event)))
}

pub async fn get_correlations(State(server): State<Arc<Server>>, Path(id): Path<String>) -> ApiResult {
    let groups = server.correlator.get_alert_correlations(&id).await?;
    Ok(Json(json!({
        "alert_id": id,
        "correlations": groups,
        "total": groups.len(),
    })))
}

pub async fn get_notifications(State(server): State<Arc<Server>>, Path(id): Path<String>) -> ApiResult {
    let notifications = server.store.list_notifications(&id).await?;
    Ok(Json(json!({
        "alert_id": id,
        "notifications": notifications,
        "total": notifications.len(),
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StatisticsQuery {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub period: Option<StatPeriod>,
    pub alert_name: Option<String>,
    pub cluster: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_statistics(
    State(server): State<Arc<Server>>,
    query: Result<Query<StatisticsQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let filter = StatisticsFilter {
        date_from: query.date_from,
        date_to: query.date_to,
        period: query.period,
        alert_name: non_empty(query.alert_name),
        cluster_name: non_empty(query.cluster),
        limit: query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_STATISTICS_LIMIT),
    };
    let statistics = server.store.list_statistics(&filter).await?;
    Ok(Json(json!({
        "statistics": statistics,
        "total": statistics.len(),
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WindowQuery {
    pub hours: Option<i64>,
    pub limit: Option<i64>,
    pub group_by: Option<String>,
}

impl WindowQuery {
    fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let hours = self.hours.filter(|h| *h > 0).unwrap_or(DEFAULT_WINDOW_HOURS);
        now - Duration::hours(hours)
    }
}

/// Firing counts per severity with the change against one hour ago.
pub async fn get_summary(State(server): State<Arc<Server>>) -> ApiResult {
    let now = Utc::now();
    let current = server.store.count_firing_by_severity(None, now).await?;
    let previous = server
        .store
        .count_firing_by_severity(None, now - Duration::hours(1))
        .await?;

    let count_of = |counts: &[crate::store::SeverityCount], severity: Severity| {
        counts
            .iter()
            .find(|c| c.severity == severity.as_str())
            .map_or(0, |c| c.count)
    };

    let mut summary = serde_json::Map::new();
    for severity in [Severity::Critical, Severity::High, Severity::Warning, Severity::Info] {
        let count = count_of(&current, severity);
        summary.insert(
            severity.as_str().to_string(),
            json!({ "count": count, "change": count - count_of(&previous, severity) }),
        );
    }
    Ok(Json(JsonValue::Object(summary)))
}

pub async fn get_trend(
    State(server): State<Arc<Server>>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let bucket_format = match query.group_by.as_deref() {
        Some("day") => "%Y-%m-%d",
        _ => "%Y-%m-%dT%H:00:00Z",
    };
    let points = server
        .store
        .alert_trend(query.since(Utc::now()), bucket_format)
        .await?;

    // One row per bucket with a column per severity.
    let mut buckets: BTreeMap<String, HashMap<String, i64>> = BTreeMap::new();
    for point in points {
        buckets.entry(point.bucket).or_default().insert(point.severity, point.count);
    }
    let trend: Vec<JsonValue> = buckets
        .into_iter()
        .map(|(bucket, counts)| {
            let count = |s: Severity| counts.get(s.as_str()).copied().unwrap_or(0);
            json!({
                "timestamp": bucket,
                "critical": count(Severity::Critical),
                "high": count(Severity::High),
                "warning": count(Severity::Warning),
                "info": count(Severity::Info),
            })
        })
        .collect();
    Ok(Json(json!(trend)))
}

pub async fn get_top_sources(
    State(server): State<Arc<Server>>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_TOP_LIMIT);
    let top = server
        .store
        .top_alert_names(query.since(Utc::now()), limit)
        .await?;
    let sources: Vec<JsonValue> = top
        .into_iter()
        .map(|c| json!({ "alert_name": c.name, "count": c.count }))
        .collect();
    Ok(Json(json!(sources)))
}

pub async fn get_by_cluster(
    State(server): State<Arc<Server>>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let clusters = server.store.count_by_cluster(query.since(Utc::now())).await?;
    let clusters: Vec<JsonValue> = clusters
        .into_iter()
        .map(|c| json!({ "cluster_name": c.name, "count": c.count }))
        .collect();
    Ok(Json(json!(clusters)))
}

// Silences

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SilenceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub silence_type: SilenceType,
    #[serde(default)]
    pub label_matchers: Vec<LabelMatcher>,
    #[serde(default)]
    pub alert_names: Vec<String>,
    #[serde(default)]
    pub resource_filters: Vec<ResourceFilter>,
    #[serde(default)]
    pub match_expression: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub created_by: String,
}

impl SilenceRequest {
    fn into_silence(self) -> std::result::Result<Silence, ApiError> {
        let missing = match self.silence_type {
            SilenceType::Label if self.label_matchers.is_empty() => Some("label_matchers are required"),
            SilenceType::AlertName if self.alert_names.is_empty() => Some("alert_names are required"),
            SilenceType::Resource if self.resource_filters.is_empty() => {
                Some("resource_filters are required")
            }
            _ => None,
        };
        if let Some(message) = missing {
            return Err(ApiError::bad_request(message));
        }

        let now = Utc::now();
        let starts_at = self.starts_at.unwrap_or(now);
        if let Some(ends_at) = self.ends_at {
            if ends_at < starts_at {
                return Err(ApiError::bad_request("ends_at must be after starts_at"));
            }
        }

        let id = Uuid::new_v4().to_string();
        let name = if self.name.is_empty() {
            format!("silence-{}", &id[..8])
        } else {
            self.name
        };
        Ok(Silence {
            id,
            name,
            description: self.description,
            enabled: self.enabled,
            silence_type: self.silence_type,
            label_matchers: self.label_matchers,
            alert_names: self.alert_names,
            resource_filters: self.resource_filters,
            match_expression: self.match_expression,
            starts_at,
            ends_at: self.ends_at,
            cluster_name: self.cluster_name,
            reason: self.reason,
            created_by: self.created_by,
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SilenceQuery {
    /// Include disabled and expired silences.
    pub all: bool,
}

pub async fn list_silences(
    State(server): State<Arc<Server>>,
    query: Result<Query<SilenceQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let silences = if query.all {
        server.store.list_silences().await?
    } else {
        server.store.list_active_silences(Utc::now()).await?
    };
    Ok(Json(json!({
        "silences": silences,
        "total": silences.len(),
    })))
}

pub async fn create_silence(
    State(server): State<Arc<Server>>,
    payload: Result<Json<SilenceRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let silence = request.into_silence()?;
    server.store.save_silence(&silence).await?;
    info!("Created silence {} ({})", silence.id, silence.name);
    Ok((StatusCode::CREATED, Json(json!({ "silence_id": silence.id }))))
}

pub async fn delete_silence(State(server): State<Arc<Server>>, Path(id): Path<String>) -> ApiResult {
    if !server.store.delete_silence(&id).await? {
        return Err(ApiError::not_found("silence not found"));
    }
    info!("Deleted silence {}", id);
    Ok(Json(json!({ "message": "silence deleted successfully" })))
}

// Routing rules

#[derive(Debug, Deserialize)]
pub struct AlertRuleRequest {
    pub name: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub alert_group: String,
    #[serde(default)]
    pub route_config: Option<RouteConfig>,
}

pub async fn create_alert_rule(
    State(server): State<Arc<Server>>,
    payload: Result<Json<AlertRuleRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    if request.name.trim().is_empty() {
        return Err(ApiError::bad_request("rule name is required"));
    }

    let now = Utc::now();
    let rule = AlertRule {
        id: Uuid::new_v4().to_string(),
        name: request.name,
        cluster_name: request.cluster_name,
        enabled: request.enabled,
        alert_group: request.alert_group,
        route_config: match request.route_config {
            Some(route) => serde_json::to_value(route).map_err(crate::Error::from)?,
            None => JsonValue::Null,
        },
        created_at: now,
        updated_at: now,
    };
    server.store.save_alert_rule(&rule).await?;
    info!("Created alert rule {} ({})", rule.id, rule.name);
    Ok((StatusCode::CREATED, Json(json!({ "rule_id": rule.id }))))
}

pub async fn list_alert_rules(State(server): State<Arc<Server>>) -> ApiResult {
    let rules = server.store.list_alert_rules().await?;
    Ok(Json(json!({
        "rules": rules,
        "total": rules.len(),
    })))
}

pub async fn get_alert_rule(State(server): State<Arc<Server>>, Path(id): Path<String>) -> ApiResult {
    let rule = server
        .store
        .get_alert_rule(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("alert rule not found"))?;
    Ok(Json(json!(rule)))
}

pub async fn delete_alert_rule(State(server): State<Arc<Server>>, Path(id): Path<String>) -> ApiResult {
    if !server.store.delete_alert_rule(&id).await? {
        return Err(ApiError::not_found("alert rule not found"));
    }
    info!("Deleted alert rule {}", id);
    Ok(Json(json!({ "message": "alert rule deleted successfully" })))
}
