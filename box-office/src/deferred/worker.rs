//! Deferred job worker
//!
//! Each received job runs on its own task. A failing job is retried with
//! exponential backoff (base * 2^attempt, capped) and handed to the error
//! reporter once the retries are exhausted.

use super::DeferredJob;
use super::reporter::ErrorReporter;
use crate::orders::aggregates::AggregateCache;
use crate::orders::storage::{OrderStorage, StorageError};
use async_trait::async_trait;
use shared::models::{Event, Order};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const DEFAULT_MAX_RETRIES: u32 = 3;
const RETRY_BASE_DELAY_SECS: u64 = 5;
const RETRY_MAX_DELAY_SECS: u64 = 60;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DeferredError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

// ========== Notifications ==========

/// Outbound messages to buyers and organisers
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver_tickets(&self, order: &Order) -> Result<(), NotifyError>;

    async fn notify_organiser(&self, order: &Order, event: &Event) -> Result<(), NotifyError>;
}

/// Logs instead of sending
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver_tickets(&self, order: &Order) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %order.id,
            account_id = %order.account_id,
            tickets = order.live_tickets().count(),
            "Delivering tickets"
        );
        Ok(())
    }

    async fn notify_organiser(&self, order: &Order, event: &Event) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %order.id,
            event_id = %event.id,
            organisation_id = %event.organisation_id,
            "Notifying organiser of order"
        );
        Ok(())
    }
}

// ========== Handler ==========

#[async_trait]
pub trait DeferredHandler: Send + Sync {
    async fn handle(&self, job: &DeferredJob) -> Result<(), DeferredError>;
}

/// Executes jobs against storage, the aggregate cache and a notifier
pub struct JobHandler {
    storage: OrderStorage,
    aggregates: AggregateCache,
    notifier: Arc<dyn Notifier>,
}

impl JobHandler {
    pub fn new(storage: OrderStorage, aggregates: AggregateCache, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            storage,
            aggregates,
            notifier,
        }
    }

    fn load_order(&self, order_id: &str) -> Result<Order, DeferredError> {
        self.storage
            .get_order(order_id)?
            .ok_or_else(|| DeferredError::OrderNotFound(order_id.to_string()))
    }
}

#[async_trait]
impl DeferredHandler for JobHandler {
    async fn handle(&self, job: &DeferredJob) -> Result<(), DeferredError> {
        match job {
            DeferredJob::DeliverTickets { order_id } => {
                let order = self.load_order(order_id)?;
                if order.is_deleted() {
                    tracing::debug!(order_id = %order_id, "Order deleted before delivery, skipping");
                    return Ok(());
                }
                self.notifier.deliver_tickets(&order).await?;
            }
            DeferredJob::NotifyOrganiser { order_id } => {
                let order = self.load_order(order_id)?;
                let event = self
                    .storage
                    .get_event(&order.event_id)?
                    .ok_or_else(|| DeferredError::EventNotFound(order.event_id.clone()))?;
                self.notifier.notify_organiser(&order, &event).await?;
            }
            DeferredJob::InvalidateEventCache { event_id } => {
                if self.aggregates.invalidate(event_id) {
                    tracing::debug!(event_id = %event_id, "Event aggregates invalidated");
                }
            }
        }
        Ok(())
    }
}

// ========== Worker ==========

pub struct DeferredWorker {
    handler: Arc<dyn DeferredHandler>,
    reporter: Arc<dyn ErrorReporter>,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl DeferredWorker {
    pub fn new(handler: Arc<dyn DeferredHandler>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            handler,
            reporter,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(RETRY_BASE_DELAY_SECS),
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }

    /// Run until the channel closes or `shutdown` is cancelled
    ///
    /// In-flight jobs get [`SHUTDOWN_GRACE`] to finish; the rest are aborted.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<DeferredJob>, shutdown: CancellationToken) {
        tracing::info!(max_retries = self.max_retries, "DeferredWorker started");
        let worker = Arc::new(self);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("DeferredWorker shutting down");
                    break;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                job = rx.recv() => {
                    match job {
                        Some(job) => {
                            let w = worker.clone();
                            in_flight.spawn(async move {
                                w.process(job).await;
                            });
                        }
                        None => {
                            tracing::info!("Job channel closed, shutting down DeferredWorker");
                            break;
                        }
                    }
                }
            }
        }

        let drain = async { while in_flight.join_next().await.is_some() {} };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            tracing::warn!(pending = in_flight.len(), "Aborting unfinished deferred jobs");
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }
    }

    /// Run one job to success or exhaustion; returns whether it succeeded
    pub async fn process(&self, job: DeferredJob) -> bool {
        let mut attempt = 0;
        loop {
            match self.handler.handle(&job).await {
                Ok(()) => {
                    tracing::debug!(job = job.name(), attempt, "Deferred job done");
                    return true;
                }
                Err(e) if attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(
                        job = job.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Deferred job failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(job = job.name(), attempt, error = %e, "Deferred job exhausted retries");
                    self.reporter.report(job.name(), &e);
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::reporter::CollectingReporter;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` attempts
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DeferredHandler for Flaky {
        async fn handle(&self, _job: &DeferredJob) -> Result<(), DeferredError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(DeferredError::OrderNotFound(format!("attempt {n}")))
            } else {
                Ok(())
            }
        }
    }

    fn worker(failures: u32, reporter: &CollectingReporter) -> (DeferredWorker, Arc<Flaky>) {
        let handler = Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
        });
        let worker = DeferredWorker::new(handler.clone(), Arc::new(reporter.clone()))
            .with_max_retries(2)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2));
        (worker, handler)
    }

    fn job() -> DeferredJob {
        DeferredJob::DeliverTickets {
            order_id: "o-1".into(),
        }
    }

    #[test]
    fn test_backoff_capped() {
        let reporter = CollectingReporter::new();
        let handler: Arc<dyn DeferredHandler> = Arc::new(Flaky {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let w = DeferredWorker::new(handler, Arc::new(reporter));
        assert_eq!(w.backoff(0), Duration::from_secs(5));
        assert_eq!(w.backoff(2), Duration::from_secs(20));
        assert_eq!(w.backoff(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let reporter = CollectingReporter::new();
        let (w, handler) = worker(2, &reporter);
        assert!(w.process(job()).await);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(reporter.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_job_is_reported() {
        let reporter = CollectingReporter::new();
        let (w, handler) = worker(10, &reporter);
        assert!(!w.process(job()).await);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(reporter.reports()[0].0, "deliver_tickets");
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let reporter = CollectingReporter::new();
        let (w, _) = worker(0, &reporter);
        let (_queue, rx) = super::super::JobQueue::new();
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), w.run(rx, token))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_job_drops_cache_entry() {
        use crate::orders::aggregates::EventAggregates;
        use shared::{Currency, Money};

        let storage = OrderStorage::open_in_memory().unwrap();
        let cache = AggregateCache::new();
        cache.insert(EventAggregates {
            event_id: "ev-1".into(),
            completed_orders: 0,
            tickets_sold: 0,
            donations: 0,
            total_value: Money::zero(Currency::parse("GBP").unwrap()),
            computed_at: 0,
        });
        let handler = JobHandler::new(storage, cache.clone(), Arc::new(LogNotifier));
        handler
            .handle(&DeferredJob::InvalidateEventCache {
                event_id: "ev-1".into(),
            })
            .await
            .unwrap();
        assert!(cache.is_empty());

        let missing = handler
            .handle(&DeferredJob::DeliverTickets {
                order_id: "nope".into(),
            })
            .await;
        assert!(matches!(missing, Err(DeferredError::OrderNotFound(_))));
    }
}
