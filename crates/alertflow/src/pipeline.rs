use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::{
    config::Config,
    correlator::Correlator,
    dispatcher::{Dispatcher, WorkerConfig},
    notifier::{NotificationService, Notifier},
    processor::{Enricher, Processor, SilenceMatcher, StatisticsRecorder, StoreMetadata},
    router::Router,
    store::Store,
    Result,
};

/// All pipeline components wired to one store.
pub struct Pipeline {
    pub store: Arc<dyn Store>,
    pub processor: Arc<Processor>,
    pub correlator: Arc<Correlator>,
    pub dispatcher: Arc<Dispatcher>,
}

impl Pipeline {
    /// Starts the background workers and builds the synchronous processor.
    pub fn build(config: &Config, store: Arc<dyn Store>) -> Result<Self> {
        let correlator = Arc::new(Correlator::new(store.clone()));
        let notifications = Arc::new(NotificationService::new(
            Router::new(store.clone()),
            Notifier::new(store.clone(), Duration::from_secs(config.notifications.timeout_secs))?,
            config.notifications.default_webhook_url.clone(),
        ));

        let dispatcher = Arc::new(Dispatcher::start(
            &WorkerConfig::from(&config.workers),
            Arc::new(StatisticsRecorder::new(store.clone())),
            correlator.clone(),
            notifications,
        ));

        let processor = Arc::new(Processor::new(
            store.clone(),
            Enricher::new(
                Arc::new(StoreMetadata::new(store.clone())),
                config.default_cluster_name.clone(),
            ),
            SilenceMatcher::new(store.clone()),
            dispatcher.clone(),
        ));

        info!("Alert pipeline ready");
        Ok(Self {
            store,
            processor,
            correlator,
            dispatcher,
        })
    }

    /// Waits for queued background work to finish.
    pub async fn shutdown(&self) {
        self.dispatcher.shutdown().await;
        info!("Alert pipeline stopped");
    }
}
