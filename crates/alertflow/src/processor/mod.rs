//! Synchronous alert handling: dedup, enrichment, silencing and persistence.
//! Everything after the insert is handed to the [`Dispatcher`].

mod enricher;
mod silence;
mod statistics;

pub use enricher::{Enricher, MetadataSource, StoreMetadata};
pub use silence::{full_regex_match, silence_matches, SilenceMatcher};
pub use statistics::{deltas_for, StatisticsRecorder, StatisticsUpdate};

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    alert::{AlertStatus, UnifiedAlert},
    dispatcher::Dispatcher,
    metrics,
    store::Store,
    Result,
};

/// What `process` did with an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Stored as a new event with the given final status.
    Created(AlertStatus),
    /// An existing firing event was marked resolved.
    Resolved,
    /// Already known, nothing changed.
    Duplicate,
}

pub struct Processor {
    store: Arc<dyn Store>,
    enricher: Enricher,
    silences: SilenceMatcher,
    dispatcher: Arc<Dispatcher>,
}

impl Processor {
    pub fn new(
        store: Arc<dyn Store>,
        enricher: Enricher,
        silences: SilenceMatcher,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            store,
            enricher,
            silences,
            dispatcher,
        }
    }

    pub async fn process(&self, mut alert: UnifiedAlert) -> Result<ProcessOutcome> {
        debug!("Processing alert {} ({})", alert.id, alert.alert_name);

        if let Some(existing) = self.store.get_alert_event(&alert.id).await? {
            if alert.status == AlertStatus::Resolved && existing.alert.status != AlertStatus::Resolved {
                let ends_at = alert.ends_at.unwrap_or_else(Utc::now);
                self.store.resolve_alert_event(&alert.id, ends_at).await?;
                info!("Alert {} resolved", alert.id);

                let mut stored = existing.alert;
                stored.status = AlertStatus::Resolved;
                stored.ends_at = Some(ends_at);
                self.dispatcher
                    .dispatch_resolved(StatisticsUpdate::Resolved { alert: stored, ends_at });
                metrics::record_processed();
                return Ok(ProcessOutcome::Resolved);
            }
            debug!("Alert {} already recorded, skipping", alert.id);
            return Ok(ProcessOutcome::Duplicate);
        }

        self.enricher.enrich(&mut alert).await;

        match self.silences.find_silence(&alert).await {
            Ok(Some(silence)) => {
                info!("Alert {} silenced by {} ({})", alert.id, silence.id, silence.name);
                alert.status = AlertStatus::Silenced;
                metrics::record_silenced();
                if let Err(e) = self.silences.record(&silence, &alert).await {
                    warn!("Failed to record silenced alert {}: {}", alert.id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Silence check failed for alert {}, not silencing: {}", alert.id, e),
        }

        if !self.store.insert_alert_event(&alert).await? {
            // Lost an insert race with a concurrent delivery of the same alert.
            debug!("Alert {} inserted concurrently, skipping", alert.id);
            return Ok(ProcessOutcome::Duplicate);
        }

        let status = alert.status;
        self.dispatcher.dispatch_created(alert, status == AlertStatus::Firing);

        metrics::record_processed();
        Ok(ProcessOutcome::Created(status))
    }
}
