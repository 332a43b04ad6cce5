mod error;
mod routes;
mod webhook;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::{correlator::Correlator, pipeline::Pipeline, processor::Processor, store::Store};

pub use error::ApiError;

pub struct Server {
    store: Arc<dyn Store>,
    processor: Arc<Processor>,
    correlator: Arc<Correlator>,
}

impl Server {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            store: pipeline.store.clone(),
            processor: pipeline.processor.clone(),
            correlator: pipeline.correlator.clone(),
        }
    }

    pub fn build_router(self) -> Router {
        let state = Arc::new(self);

        Router::new()
            .route("/health", get(routes::health))
            .route("/metrics", get(routes::get_metrics))
            // Ingestion
            .route("/v1/alerts/metric", post(webhook::receive_metric))
            .route("/v1/alerts/alertmanager", post(webhook::receive_alertmanager))
            .route("/api/v2/alerts", post(webhook::receive_alertmanager))
            .route("/v1/alerts/log", post(webhook::receive_log))
            .route("/v1/alerts/trace", post(webhook::receive_trace))
            .route("/v1/alerts/webhook", post(webhook::receive_generic))
            .route("/v1/alerts/webhook/{name}", post(webhook::receive_named))
            // Queries
            .route("/v1/alerts", get(routes::list_alerts))
            .route("/v1/alerts/statistics", get(routes::get_statistics))
            .route("/v1/alerts/summary", get(routes::get_summary))
            .route("/v1/alerts/trend", get(routes::get_trend))
            .route("/v1/alerts/top-sources", get(routes::get_top_sources))
            .route("/v1/alerts/by-cluster", get(routes::get_by_cluster))
            .route("/v1/alerts/{id}", get(routes::get_alert))
            .route("/v1/alerts/{id}/correlations", get(routes::get_correlations))
            .route("/v1/alerts/{id}/notifications", get(routes::get_notifications))
            // Silences and routing rules
            .route("/v1/silences", get(routes::list_silences).post(routes::create_silence))
            .route("/v1/silences/{id}", delete(routes::delete_silence))
            .route("/v1/alert-rules", get(routes::list_alert_rules).post(routes::create_alert_rule))
            .route(
                "/v1/alert-rules/{id}",
                get(routes::get_alert_rule).delete(routes::delete_alert_rule),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}
