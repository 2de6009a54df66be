use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crawler_core::{Config, CrawlerError, UrlValidator};
use crawler_coordination::KvClient;
use crawler_metrics::Metrics;

use crate::admission;
use crate::budget::BudgetGate;
use crate::bus::BusProducer;
use crate::frontier::Frontier;
use crate::health::{self, HealthState};
use crate::worker::{self, WorkerContext};

const FRONTIER_CAPACITY: usize = 10_000;
/// How often the engine polls the processed count against the page budget.
const BUDGET_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Owns every long-lived piece of the crawl and drives it from startup to a
/// clean, bounded shutdown.
pub struct Engine {
    config: Config,
    validator: Arc<UrlValidator>,
    metrics: Arc<Metrics>,
    kv: Arc<KvClient>,
    bus: Arc<BusProducer>,
    frontier: Arc<Frontier>,
    budget: Arc<BudgetGate>,
}

impl Engine {
    pub async fn bootstrap(config: Config) -> Result<Self, CrawlerError> {
        let validator = Arc::new(UrlValidator::new(
            config.crawl.whitelist.clone(),
            config.crawl.blacklist.clone(),
        ));
        let metrics = Arc::new(Metrics::new());
        let kv = Arc::new(KvClient::connect(&config.kv).await?);
        let bus = Arc::new(BusProducer::new(&config.bus)?);
        let frontier = Frontier::new(FRONTIER_CAPACITY);
        let budget = Arc::new(BudgetGate::new(config.crawl.max_pages));

        Ok(Self {
            config,
            validator,
            metrics,
            kv,
            bus,
            frontier,
            budget,
        })
    }

    /// Runs the full crawl to completion: seeds the frontier, spawns the
    /// worker pool and monitor server, and blocks until either the page
    /// budget is reached or a shutdown signal arrives.
    pub async fn run(self) -> Result<(), CrawlerError> {
        let Self {
            config,
            validator,
            metrics,
            kv,
            bus,
            frontier,
            budget,
        } = self;

        let (shutdown_tx, _) = broadcast::channel(1);

        for seed in &config.crawl.seeds {
            if let Some(task) = admission::admit(&validator, &metrics, config.crawl.max_depth, seed, 1, None) {
                frontier.enqueue_seed(task).await;
            }
        }
        info!(count = config.crawl.seeds.len(), "seeds admitted");

        let worker_ctx = Arc::new(WorkerContext::new(
            &config,
            frontier.clone(),
            budget.clone(),
            kv.clone(),
            bus.clone(),
            validator.clone(),
            metrics.clone(),
        )?);

        let mut workers = JoinSet::new();
        for id in 0..config.performance.max_concurrency {
            let ctx = worker_ctx.clone();
            let rx = shutdown_tx.subscribe();
            workers.spawn(async move {
                worker::run(id, ctx, rx).await;
                id
            });
        }

        let health_state = Arc::new(HealthState {
            kv: kv.clone(),
            bus: bus.clone(),
            metrics: metrics.clone(),
        });
        let monitor_port = config.app.monitor_port;
        let monitor_shutdown = shutdown_tx.subscribe();
        let monitor = tokio::spawn(health::serve(monitor_port, health_state, monitor_shutdown));

        let watcher_shutdown = shutdown_tx.clone();
        let watcher_metrics = metrics.clone();
        let max_pages = config.crawl.max_pages;
        let watcher = tokio::spawn(async move {
            loop {
                tokio::time::sleep(BUDGET_POLL_INTERVAL).await;
                if watcher_metrics.processed() >= max_pages {
                    info!("page budget reached, signaling shutdown");
                    let _ = watcher_shutdown.send(());
                    return;
                }
            }
        });

        let ctrl_c_shutdown = shutdown_tx.clone();
        let ctrl_c = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = ctrl_c_shutdown.send(());
            }
        });

        while workers.join_next().await.is_some() {}
        watcher.abort();
        ctrl_c.abort();
        let _ = shutdown_tx.send(());

        if let Err(e) = bus.flush(config.performance.request_timeout).await {
            warn!(error = %e, "final bus flush failed");
        }

        match monitor.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "monitor server exited with error"),
            Err(e) => warn!(error = %e, "monitor server task panicked"),
        }

        info!(
            processed = metrics.processed(),
            successful = metrics.successful(),
            failed = metrics.failed(),
            "crawl complete"
        );

        Ok(())
    }
}
