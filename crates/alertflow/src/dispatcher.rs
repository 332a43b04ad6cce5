use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{alert::UnifiedAlert, metrics, processor::StatisticsUpdate, Error, Result};

/// Consumer of one kind of background task.
#[async_trait]
pub trait TaskHandler<T>: Send + Sync {
    async fn handle(&self, task: T);
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    pub statistics_workers: usize,
    pub correlation_workers: usize,
    pub notification_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            statistics_workers: 2,
            correlation_workers: 2,
            notification_workers: 4,
        }
    }
}

/// Bounded queue drained by a fixed set of worker tasks.
pub struct WorkerPool<T> {
    name: &'static str,
    sender: RwLock<Option<mpsc::Sender<T>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn start(
        name: &'static str,
        capacity: usize,
        workers: usize,
        handler: Arc<dyn TaskHandler<T>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    debug!("{} worker {} started", name, worker);
                    loop {
                        // Hold the lock only while waiting so other workers can run tasks.
                        let task = { rx.lock().await.recv().await };
                        let Some(task) = task else { break };
                        if AssertUnwindSafe(handler.handle(task)).catch_unwind().await.is_err() {
                            error!("{} worker {} recovered from a panicking task", name, worker);
                        }
                    }
                    debug!("{} worker {} stopped", name, worker);
                })
            })
            .collect();

        info!("Started {} {} workers (queue capacity {})", workers.max(1), name, capacity.max(1));
        Self {
            name,
            sender: RwLock::new(Some(tx)),
            workers: Mutex::new(handles),
        }
    }

    /// Enqueues a task, waiting for capacity when the queue is full.
    pub async fn submit(&self, task: T) -> Result<()> {
        let sender = self.sender.read().await.clone();
        let Some(sender) = sender else {
            metrics::record_queue_rejection(self.name);
            return Err(Error::QueueClosed(self.name.to_string()));
        };
        sender.send(task).await.map_err(|_| {
            metrics::record_queue_rejection(self.name);
            Error::QueueClosed(self.name.to_string())
        })
    }

    /// Closes the queue and waits until every queued task has been handled.
    pub async fn shutdown(&self) {
        self.sender.write().await.take();
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("{} worker terminated abnormally: {}", self.name, e);
            }
        }
        debug!("{} queue drained", self.name);
    }
}

/// Background queues fed by the processor.
pub struct Dispatcher {
    statistics: WorkerPool<StatisticsUpdate>,
    correlation: WorkerPool<UnifiedAlert>,
    notification: WorkerPool<UnifiedAlert>,
    handoffs: StdMutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn start(
        config: &WorkerConfig,
        statistics: Arc<dyn TaskHandler<StatisticsUpdate>>,
        correlation: Arc<dyn TaskHandler<UnifiedAlert>>,
        notification: Arc<dyn TaskHandler<UnifiedAlert>>,
    ) -> Self {
        Self {
            statistics: WorkerPool::start(
                "statistics",
                config.queue_capacity,
                config.statistics_workers,
                statistics,
            ),
            correlation: WorkerPool::start(
                "correlation",
                config.queue_capacity,
                config.correlation_workers,
                correlation,
            ),
            notification: WorkerPool::start(
                "notification",
                config.queue_capacity,
                config.notification_workers,
                notification,
            ),
            handoffs: StdMutex::new(Vec::new()),
        }
    }

    /// Queues follow-up work for a newly stored alert on a detached task, so
    /// dropping the caller's future cannot lose it. The notification is only
    /// queued when `notify` is set.
    pub fn dispatch_created(self: &Arc<Self>, alert: UnifiedAlert, notify: bool) {
        let dispatcher = self.clone();
        self.track(async move {
            let id = alert.id.clone();
            if let Err(e) = dispatcher.submit_statistics(StatisticsUpdate::Fired(alert.clone())).await {
                error!("Failed to enqueue statistics for {}: {}", id, e);
            }
            if let Err(e) = dispatcher.submit_correlation(alert.clone()).await {
                error!("Failed to enqueue correlation for {}: {}", id, e);
            }
            if notify {
                if let Err(e) = dispatcher.submit_notification(alert).await {
                    error!("Failed to enqueue notification for {}: {}", id, e);
                }
            }
        });
    }

    /// Detached counterpart of [`Dispatcher::dispatch_created`] for a resolution.
    pub fn dispatch_resolved(self: &Arc<Self>, update: StatisticsUpdate) {
        let dispatcher = self.clone();
        self.track(async move {
            let id = update.alert().id.clone();
            if let Err(e) = dispatcher.submit_statistics(update).await {
                error!("Failed to enqueue statistics for {}: {}", id, e);
            }
        });
    }

    fn track(&self, handoff: impl Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(handoff);
        match self.handoffs.lock() {
            Ok(mut handoffs) => {
                handoffs.retain(|h| !h.is_finished());
                handoffs.push(handle);
            }
            Err(_) => error!("Hand-off list poisoned, not tracking task"),
        }
    }

    async fn drain_handoffs(&self) {
        loop {
            let pending: Vec<_> = match self.handoffs.lock() {
                Ok(mut handoffs) => std::mem::take(&mut *handoffs),
                Err(_) => break,
            };
            if pending.is_empty() {
                break;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    error!("Hand-off task terminated abnormally: {}", e);
                }
            }
        }
    }

    pub async fn submit_statistics(&self, update: StatisticsUpdate) -> Result<()> {
        self.statistics.submit(update).await
    }

    pub async fn submit_correlation(&self, alert: UnifiedAlert) -> Result<()> {
        self.correlation.submit(alert).await
    }

    pub async fn submit_notification(&self, alert: UnifiedAlert) -> Result<()> {
        self.notification.submit(alert).await
    }

    /// Waits for pending hand-offs, then stops accepting work and drains all
    /// three queues.
    pub async fn shutdown(&self) {
        info!("Draining background queues");
        self.drain_handoffs().await;
        tokio::join!(
            self.statistics.shutdown(),
            self.correlation.shutdown(),
            self.notification.shutdown(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counter {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler<u32> for Counter {
        async fn handle(&self, task: u32) {
            if task == 13 {
                panic!("unlucky task");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_tasks() {
        let counter = Arc::new(Counter { seen: AtomicUsize::new(0) });
        let pool = WorkerPool::<u32>::start("test", 4, 2, counter.clone());

        for i in 0..20 {
            pool.submit(i).await.unwrap();
        }
        pool.shutdown().await;

        // Task 13 panics; the worker survives and handles the rest.
        assert_eq!(counter.seen.load(Ordering::SeqCst), 19);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let counter = Arc::new(Counter { seen: AtomicUsize::new(0) });
        let pool = WorkerPool::<u32>::start("test", 1, 1, counter);
        pool.shutdown().await;

        assert!(matches!(pool.submit(1).await, Err(Error::QueueClosed(_))));
    }
}
