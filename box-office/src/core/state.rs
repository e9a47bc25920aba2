use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::deferred::{
    DeferredWorker, ErrorReporter, JobHandler, JobQueue, LogNotifier, Notifier, TracingReporter,
};
use crate::gateway::{GatewayConnector, GatewayError, StripeConnector};
use crate::orders::aggregates::AggregateCache;
use crate::orders::storage::{OrderStorage, StorageError};
use crate::orders::OrdersManager;
use shared::money::StaticRatesError;
use shared::util::now_millis;
use shared::{ExchangeRates, StaticRates};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to prepare work directory {path}: {source}")]
    WorkDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open order storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read exchange rates from {path}: {source}")]
    RatesFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Rates(#[from] StaticRatesError),

    #[error("Failed to build gateway client: {0}")]
    Gateway(#[from] GatewayError),
}

/// Pluggable collaborators of the box office
pub struct Collaborators {
    pub connector: Arc<dyn GatewayConnector>,
    pub rates: Arc<dyn ExchangeRates>,
    pub notifier: Arc<dyn Notifier>,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Running box office: the order manager plus its background worker
///
/// | Part | Description |
/// |------|-------------|
/// | manager | Order engine, shared with trigger handlers |
/// | tasks | Deferred job worker and aggregate sweep, stopped by [`BoxOffice::shutdown`] |
pub struct BoxOffice {
    config: Config,
    manager: Arc<OrdersManager>,
    tasks: BackgroundTasks,
}

impl BoxOffice {
    /// Open storage, build the gateway client and start the deferred worker
    ///
    /// Must be called within a Tokio runtime.
    pub fn initialize(config: &Config) -> Result<Self, StartupError> {
        std::fs::create_dir_all(&config.work_dir).map_err(|source| StartupError::WorkDir {
            path: config.work_dir.clone(),
            source,
        })?;

        let storage = OrderStorage::open(config.database_file())?;
        let connector = StripeConnector::new(
            config.gateway_api_base.clone(),
            config.gateway_api_version.clone(),
            Duration::from_millis(config.gateway_timeout_ms),
        )?;

        Ok(Self::with_collaborators(
            config,
            storage,
            Collaborators {
                connector: Arc::new(connector),
                rates: Arc::new(load_rates(config)?),
                notifier: Arc::new(LogNotifier),
                reporter: Arc::new(TracingReporter),
            },
        ))
    }

    /// Assemble from already opened storage and explicit collaborators
    pub fn with_collaborators(config: &Config, storage: OrderStorage, parts: Collaborators) -> Self {
        let (jobs, rx) = JobQueue::new();
        let aggregates = AggregateCache::new();

        let manager = OrdersManager::new(storage.clone(), parts.connector, parts.rates, jobs)
            .with_reporter(parts.reporter.clone())
            .with_aggregate_cache(aggregates.clone());

        let handler = JobHandler::new(storage, aggregates.clone(), parts.notifier);
        let worker = DeferredWorker::new(Arc::new(handler), parts.reporter)
            .with_max_retries(config.deferred_max_retries);

        let mut tasks = BackgroundTasks::new();
        let token = tasks.shutdown_token();
        tasks.spawn("deferred_worker", TaskKind::Worker, worker.run(rx, token));

        // 0 disables expiry
        if config.aggregate_ttl_secs > 0 {
            let ttl = Duration::from_secs(config.aggregate_ttl_secs);
            let token = tasks.shutdown_token();
            tasks.spawn(
                "aggregate_sweep",
                TaskKind::Periodic,
                sweep_aggregates(aggregates, ttl, token),
            );
        }

        tracing::info!(
            database = %config.database_file().display(),
            environment = %config.environment,
            "Box office initialized"
        );

        Self {
            config: config.clone(),
            manager: Arc::new(manager),
            tasks,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn manager(&self) -> &Arc<OrdersManager> {
        &self.manager
    }

    /// Background tasks that stopped before shutdown
    pub fn stopped_tasks(&self) -> Vec<&'static str> {
        self.tasks.stopped()
    }

    pub async fn shutdown(self) {
        self.tasks.shutdown().await;
    }
}

async fn sweep_aggregates(cache: AggregateCache, ttl: Duration, token: CancellationToken) {
    let mut interval = tokio::time::interval(ttl);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let cutoff = now_millis() - ttl.as_millis() as i64;
                let evicted = cache.evict_older_than(cutoff);
                if evicted > 0 {
                    tracing::debug!(evicted, "Evicted stale event aggregates");
                }
            }
        }
    }
}

/// Rate table from `EXCHANGE_RATES_PATH`; empty (identity only) when unset
fn load_rates(config: &Config) -> Result<StaticRates, StartupError> {
    let Some(path) = config.exchange_rates_path.as_deref() else {
        tracing::info!("No exchange rate table configured, cross-currency orders will fail");
        return Ok(StaticRates::new());
    };
    let json = std::fs::read_to_string(path).map_err(|source| StartupError::RatesFile {
        path: path.to_string(),
        source,
    })?;
    let rates = StaticRates::from_json(&json)?;
    tracing::info!(path = %path, pairs = rates.len(), "Exchange rates loaded");
    Ok(rates)
}
