//! The distributor: stateless write/read router in front of the ingesters
//!
//! Writes are sharded by ring token across replicated ingesters and
//! acknowledged on per-sample quorum; reads fan out to the replicas owning
//! the queried series and merge their answers. A maintenance loop prunes
//! pooled clients for ingesters that left the ring and rate limiters for
//! tenants that went quiet.

mod broadcast;
mod read;
mod write;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::Registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::IngesterConnector;
use crate::config::DistributorConfig;
use crate::metrics::{ClientPoolCollector, DistributorMetrics};
use crate::pool::IngesterClientPool;
use crate::rate_limit::IngestLimiters;
use crate::ring::ReplicaRing;
use crate::Result;

/// Routes tenant writes and reads to the replicated ingester fleet.
pub struct Distributor {
    cfg: DistributorConfig,
    ring: Arc<dyn ReplicaRing>,
    pool: Arc<IngesterClientPool>,
    limiters: Arc<IngestLimiters>,
    metrics: Arc<DistributorMetrics>,
    shutdown: parking_lot::Mutex<CancellationToken>,
    maintenance: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Distributor {
    /// Builds a distributor and registers its metric surface.
    ///
    /// Construction does not spawn anything; call [`Distributor::start`]
    /// to run the maintenance loop.
    pub fn new(
        cfg: DistributorConfig,
        ring: Arc<dyn ReplicaRing>,
        connector: Arc<dyn IngesterConnector>,
        registry: &Registry,
    ) -> Result<Self> {
        cfg.validate()?;

        let pool = Arc::new(IngesterClientPool::new(connector, cfg.remote_timeout));
        let metrics = Arc::new(DistributorMetrics::new(registry)?);
        registry.register(Box::new(ClientPoolCollector::new(pool.clone())?))?;
        let limiters = Arc::new(IngestLimiters::new(
            cfg.ingestion_rate_limit,
            cfg.ingestion_burst_size,
        ));

        Ok(Self {
            cfg,
            ring,
            pool,
            limiters,
            metrics,
            shutdown: parking_lot::Mutex::new(CancellationToken::new()),
            maintenance: parking_lot::Mutex::new(None),
        })
    }

    /// Starts the background maintenance loop. Calling it again while the
    /// loop is running is a no-op.
    ///
    /// Each start gets its own cancellation token, so a stopped
    /// distributor can be started again.
    pub fn start(&self) {
        let mut slot = self.maintenance.lock();
        if slot.is_some() {
            return;
        }
        let shutdown = CancellationToken::new();
        *self.shutdown.lock() = shutdown.clone();
        *slot = Some(tokio::spawn(maintenance_loop(
            self.ring.clone(),
            self.pool.clone(),
            self.limiters.clone(),
            self.cfg.client_cleanup_period,
            self.cfg.limiter_idle_timeout,
            shutdown,
        )));
    }

    /// Stops the maintenance loop and waits for it to exit. Idempotent;
    /// in-flight requests are not joined and [`Distributor::start`] may
    /// be called again afterwards.
    pub async fn stop(&self) {
        self.shutdown.lock().cancel();
        let handle = self.maintenance.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Number of pooled ingester clients, as the scrape gauge reports it.
    pub fn client_count(&self) -> usize {
        self.pool.len()
    }

    /// Number of tenants with a live rate limiter.
    pub fn limiter_count(&self) -> usize {
        self.limiters.len()
    }
}

async fn maintenance_loop(
    ring: Arc<dyn ReplicaRing>,
    pool: Arc<IngesterClientPool>,
    limiters: Arc<IngestLimiters>,
    cleanup_period: Duration,
    limiter_idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    let first_tick = tokio::time::Instant::now() + cleanup_period;
    let mut ticker = tokio::time::interval_at(first_tick, cleanup_period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("maintenance loop stopped");
                return;
            }
            _ = ticker.tick() => {
                let addresses: HashSet<String> =
                    ring.all().into_iter().map(|desc| desc.address).collect();
                pool.prune_absent(&addresses).await;
                limiters.prune_idle(Instant::now(), limiter_idle_timeout);
            }
        }
    }
}
