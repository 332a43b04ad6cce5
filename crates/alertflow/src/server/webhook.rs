use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{error, info};

use super::{ApiError, Server};
use crate::{
    alert::UnifiedAlert,
    metrics,
    receivers::{
        convert_alertmanager_items, convert_generic_webhook, convert_log_alert, convert_metric_webhook,
        convert_trace_alert, LogAlertRequest, MetricAlertItem, MetricWebhook, TraceAlertRequest,
    },
};

type ApiResult = std::result::Result<Json<JsonValue>, ApiError>;

/// Processes a batch one alert at a time. Failures are logged and left out
/// of the processed count.
async fn process_batch(server: &Server, alerts: Vec<UnifiedAlert>) -> JsonValue {
    let received = alerts.len();
    let mut processed = 0;
    for alert in alerts {
        let id = alert.id.clone();
        match server.processor.process(alert).await {
            Ok(_) => processed += 1,
            Err(e) => error!("Failed to process metric alert {}: {}", id, e),
        }
    }
    info!("Processed {} of {} metric alerts", processed, received);
    json!({ "received": received, "processed": processed })
}

async fn process_single(server: &Server, alert: UnifiedAlert) -> ApiResult {
    metrics::record_received(&alert.source.to_string(), 1);
    let alert_id = alert.id.clone();
    server.processor.process(alert).await?;
    Ok(Json(json!({ "alert_id": alert_id })))
}

pub async fn receive_metric(
    State(server): State<Arc<Server>>,
    payload: Result<Json<MetricWebhook>, JsonRejection>,
) -> ApiResult {
    let Json(webhook) = payload?;
    info!(
        "Received metric webhook from {:?} with {} alerts",
        webhook.receiver,
        webhook.alerts.len()
    );
    metrics::record_received("metric", webhook.alerts.len() as u64);
    Ok(Json(process_batch(&server, convert_metric_webhook(&webhook)).await))
}

pub async fn receive_alertmanager(
    State(server): State<Arc<Server>>,
    payload: Result<Json<Vec<MetricAlertItem>>, JsonRejection>,
) -> ApiResult {
    let Json(items) = payload?;
    info!("Received {} AlertManager alerts", items.len());
    metrics::record_received("metric", items.len() as u64);
    Ok(Json(process_batch(&server, convert_alertmanager_items(&items)).await))
}

pub async fn receive_log(
    State(server): State<Arc<Server>>,
    payload: Result<Json<LogAlertRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    info!("Received log alert {:?}", request.rule_name);
    process_single(&server, convert_log_alert(&request)).await
}

pub async fn receive_trace(
    State(server): State<Arc<Server>>,
    payload: Result<Json<TraceAlertRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    info!("Received trace alert {:?}", request.rule_name);
    process_single(&server, convert_trace_alert(&request)).await
}

pub async fn receive_generic(
    State(server): State<Arc<Server>>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> ApiResult {
    let Json(data) = payload?;
    process_single(&server, convert_generic_webhook(&data)).await
}

/// Sink for outbound webhook deliveries addressed back to this service,
/// such as the default notification route. Bodies are acknowledged and
/// logged, never re-ingested.
pub async fn receive_named(
    Path(name): Path<String>,
    payload: Result<Json<JsonValue>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    info!(
        "Webhook sink {} received notification for alert {}",
        name,
        body.get("alert_id").and_then(JsonValue::as_str).unwrap_or("unknown")
    );
    Ok(Json(json!({ "sink": name, "status": "accepted" })))
}
