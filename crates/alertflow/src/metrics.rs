use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

use crate::{Error, Result};

pub struct PipelineMetrics {
    pub alerts_received: IntCounterVec,
    pub alerts_processed: IntCounter,
    pub alerts_silenced: IntCounter,
    pub correlations_created: IntCounter,
    pub notifications: IntCounterVec,
    pub queue_rejections: IntCounterVec,
}

impl PipelineMetrics {
    fn register(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            alerts_received: IntCounterVec::new(
                Opts::new("alertflow_alerts_received_total", "Alerts received, by source."),
                &["source"],
            )?,
            alerts_processed: IntCounter::new(
                "alertflow_alerts_processed_total",
                "Alerts that completed synchronous processing.",
            )?,
            alerts_silenced: IntCounter::new(
                "alertflow_alerts_silenced_total",
                "Alerts suppressed by a silence.",
            )?,
            correlations_created: IntCounter::new(
                "alertflow_correlations_created_total",
                "Correlation rows written.",
            )?,
            notifications: IntCounterVec::new(
                Opts::new("alertflow_notifications_total", "Notification attempts, by channel and outcome."),
                &["channel", "outcome"],
            )?,
            queue_rejections: IntCounterVec::new(
                Opts::new("alertflow_queue_rejections_total", "Tasks refused by a closed queue."),
                &["queue"],
            )?,
        };
        registry.register(Box::new(metrics.alerts_received.clone()))?;
        registry.register(Box::new(metrics.alerts_processed.clone()))?;
        registry.register(Box::new(metrics.alerts_silenced.clone()))?;
        registry.register(Box::new(metrics.correlations_created.clone()))?;
        registry.register(Box::new(metrics.notifications.clone()))?;
        registry.register(Box::new(metrics.queue_rejections.clone()))?;
        Ok(metrics)
    }
}

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    static ref METRICS: Option<PipelineMetrics> = match PipelineMetrics::register(&REGISTRY) {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            warn!("Metrics disabled, registration failed: {}", e);
            None
        }
    };
}

pub fn record_received(source: &str, count: u64) {
    if let Some(m) = METRICS.as_ref() {
        m.alerts_received.with_label_values(&[source]).inc_by(count);
    }
}

pub fn record_processed() {
    if let Some(m) = METRICS.as_ref() {
        m.alerts_processed.inc();
    }
}

pub fn record_silenced() {
    if let Some(m) = METRICS.as_ref() {
        m.alerts_silenced.inc();
    }
}

pub fn record_correlations(count: usize) {
    if let Some(m) = METRICS.as_ref() {
        m.correlations_created.inc_by(count as u64);
    }
}

pub fn record_notification(channel: &str, outcome: &str) {
    if let Some(m) = METRICS.as_ref() {
        m.notifications.with_label_values(&[channel, outcome]).inc();
    }
}

pub fn record_queue_rejection(queue: &str) {
    if let Some(m) = METRICS.as_ref() {
        m.queue_rejections.with_label_values(&[queue]).inc();
    }
}

/// Text exposition of every registered metric.
pub fn gather_metrics() -> Result<String> {
    lazy_static::initialize(&METRICS);
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_recorded_counters() {
        record_received("metric", 3);
        record_notification("webhook", "sent");

        let text = gather_metrics().unwrap();
        assert!(text.contains("alertflow_alerts_received_total{source=\"metric\"}"));
        assert!(text.contains("alertflow_notifications_total"));
    }
}
