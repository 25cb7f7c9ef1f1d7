//! Distributor metric instruments
//!
//! The metric names below are a stable scrape surface; they stay
//! compatible with the Cortex distributor dashboards deployments already
//! run. All instruments register against a caller-supplied registry so
//! tests can scrape in isolation.

use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::pool::IngesterClientPool;
use crate::Result;

/// Counters and histograms exported by the distributor.
pub struct DistributorMetrics {
    pub query_duration: HistogramVec,
    pub received_samples: IntCounter,
    pub send_duration: HistogramVec,
    pub ingester_appends: IntCounterVec,
    pub ingester_append_failures: IntCounterVec,
    pub ingester_queries: IntCounterVec,
    pub ingester_query_failures: IntCounterVec,
}

impl DistributorMetrics {
    /// Builds and registers every instrument.
    pub fn new(registry: &Registry) -> Result<Self> {
        let query_duration = HistogramVec::new(
            HistogramOpts::new(
                "cortex_distributor_query_duration_seconds",
                "Time spent executing expression queries.",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0,
            ]),
            &["method", "status_code"],
        )?;
        let received_samples = IntCounter::new(
            "cortex_distributor_received_samples_total",
            "The total number of received samples.",
        )?;
        let send_duration = HistogramVec::new(
            HistogramOpts::new(
                "cortex_distributor_send_duration_seconds",
                "Time spent sending a sample batch to multiple replicated ingesters.",
            )
            .buckets(vec![
                0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["method", "status_code"],
        )?;
        let ingester_appends = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_appends_total",
                "The total number of batch appends sent to ingesters.",
            ),
            &["ingester"],
        )?;
        let ingester_append_failures = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_append_failures_total",
                "The total number of failed batch appends sent to ingesters.",
            ),
            &["ingester"],
        )?;
        let ingester_queries = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_queries_total",
                "The total number of queries sent to ingesters.",
            ),
            &["ingester"],
        )?;
        let ingester_query_failures = IntCounterVec::new(
            Opts::new(
                "cortex_distributor_ingester_query_failures_total",
                "The total number of failed queries sent to ingesters.",
            ),
            &["ingester"],
        )?;

        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(received_samples.clone()))?;
        registry.register(Box::new(send_duration.clone()))?;
        registry.register(Box::new(ingester_appends.clone()))?;
        registry.register(Box::new(ingester_append_failures.clone()))?;
        registry.register(Box::new(ingester_queries.clone()))?;
        registry.register(Box::new(ingester_query_failures.clone()))?;

        Ok(Self {
            query_duration,
            received_samples,
            send_duration,
            ingester_appends,
            ingester_append_failures,
            ingester_queries,
            ingester_query_failures,
        })
    }
}

/// Records an operation's duration under its method and outcome.
pub(crate) fn observe_duration(hist: &HistogramVec, method: &str, ok: bool, seconds: f64) {
    let status_code = if ok { "200" } else { "500" };
    hist.with_label_values(&[method, status_code]).observe(seconds);
}

/// Scrape-time gauge of the client-pool size.
///
/// Computed on collect rather than kept in lockstep with the pool, so the
/// pool's hot path never touches a metric.
pub struct ClientPoolCollector {
    pool: Arc<IngesterClientPool>,
    clients: IntGauge,
}

impl ClientPoolCollector {
    pub fn new(pool: Arc<IngesterClientPool>) -> Result<Self> {
        let clients = IntGauge::new(
            "cortex_distributor_ingester_clients",
            "The current number of ingester clients.",
        )?;
        Ok(Self { pool, clients })
    }
}

impl Collector for ClientPoolCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.clients.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.clients.set(self.pool.len() as i64);
        self.clients.collect()
    }
}
