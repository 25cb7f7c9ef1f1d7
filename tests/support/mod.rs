//! Shared fixtures for distributor integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use prometheus::Registry;

use meridian_distributor::client::{IngesterClient, IngesterConnector};
use meridian_distributor::model::*;
use meridian_distributor::ring::{IngesterDesc, Operation, ReplicaRing, ReplicaSet};
use meridian_distributor::{Distributor, DistributorConfig, Error, RequestContext, Result};

/// Ring stub answering every token with a prefix of a fixed member list.
pub struct StaticRing {
    ingesters: Mutex<Vec<IngesterDesc>>,
    pub seen_tokens: Mutex<Vec<u32>>,
}

impl StaticRing {
    pub fn new(ingesters: Vec<IngesterDesc>) -> Self {
        Self {
            ingesters: Mutex::new(ingesters),
            seen_tokens: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the membership, as a gossip update would.
    pub fn set_ingesters(&self, ingesters: Vec<IngesterDesc>) {
        *self.ingesters.lock() = ingesters;
    }
}

impl ReplicaRing for StaticRing {
    fn get(&self, token: u32, n: usize, _op: Operation) -> Result<ReplicaSet> {
        self.seen_tokens.lock().push(token);
        Ok(self.ingesters.lock().iter().take(n).cloned().collect())
    }

    fn batch_get(&self, tokens: &[u32], n: usize, op: Operation) -> Result<Vec<ReplicaSet>> {
        tokens.iter().map(|&token| self.get(token, n, op)).collect()
    }

    fn all(&self) -> Vec<IngesterDesc> {
        self.ingesters.lock().clone()
    }
}

/// Scriptable in-memory ingester.
#[derive(Default)]
pub struct MockIngester {
    pub address: String,
    pub fail_pushes: AtomicBool,
    pub fail_queries: AtomicBool,
    pub pushes: Mutex<Vec<WriteRequest>>,
    pub query_response: Mutex<QueryResponse>,
    pub label_values_response: Mutex<Vec<String>>,
    pub metrics_response: Mutex<Vec<Vec<Label>>>,
    pub user_stats_response: Mutex<UserStatsResponse>,
    pub closed: AtomicBool,
}

impl MockIngester {
    pub fn push_count(&self) -> usize {
        self.pushes.lock().len()
    }

    pub fn set_query_series(&self, labels: &[(&str, &str)], samples: &[(i64, f64)]) {
        *self.query_response.lock() = QueryResponse {
            timeseries: vec![series_with(labels, samples)],
        };
    }
}

#[async_trait]
impl IngesterClient for MockIngester {
    async fn push(&self, _ctx: &RequestContext, req: WriteRequest) -> Result<()> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(Error::upstream(&self.address, "push refused"));
        }
        self.pushes.lock().push(req);
        Ok(())
    }

    async fn query(&self, _ctx: &RequestContext, _req: QueryRequest) -> Result<QueryResponse> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::upstream(&self.address, "query refused"));
        }
        Ok(self.query_response.lock().clone())
    }

    async fn label_values(
        &self,
        _ctx: &RequestContext,
        _req: LabelValuesRequest,
    ) -> Result<LabelValuesResponse> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::upstream(&self.address, "query refused"));
        }
        Ok(LabelValuesResponse {
            label_values: self.label_values_response.lock().clone(),
        })
    }

    async fn metrics_for_label_matchers(
        &self,
        _ctx: &RequestContext,
        _req: MetricsForLabelMatchersRequest,
    ) -> Result<MetricsForLabelMatchersResponse> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::upstream(&self.address, "query refused"));
        }
        Ok(MetricsForLabelMatchersResponse {
            metrics: self.metrics_response.lock().clone(),
        })
    }

    async fn user_stats(
        &self,
        _ctx: &RequestContext,
        _req: UserStatsRequest,
    ) -> Result<UserStatsResponse> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::upstream(&self.address, "query refused"));
        }
        Ok(*self.user_stats_response.lock())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out registered mock ingesters.
#[derive(Default)]
pub struct MockConnector {
    ingesters: Mutex<HashMap<String, Arc<MockIngester>>>,
    pub dials: AtomicUsize,
}

impl MockConnector {
    pub fn register(&self, address: &str) -> Arc<MockIngester> {
        let ingester = Arc::new(MockIngester {
            address: address.to_string(),
            ..Default::default()
        });
        self.ingesters
            .lock()
            .insert(address.to_string(), ingester.clone());
        ingester
    }
}

#[async_trait]
impl IngesterConnector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn IngesterClient>> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        match self.ingesters.lock().get(address) {
            Some(ingester) => {
                let client: Arc<dyn IngesterClient> = ingester.clone();
                Ok(client)
            }
            None => Err(Error::upstream(address, "connection refused")),
        }
    }
}

/// Live descriptor heartbeating right now.
pub fn live_desc(address: &str) -> IngesterDesc {
    IngesterDesc {
        address: address.to_string(),
        heartbeat_timestamp: Utc::now().timestamp(),
        tokens: vec![],
    }
}

/// Descriptor whose heartbeat went stale an hour ago.
pub fn stale_desc(address: &str) -> IngesterDesc {
    IngesterDesc {
        address: address.to_string(),
        heartbeat_timestamp: Utc::now().timestamp() - 3600,
        tokens: vec![],
    }
}

/// A series named `metric` with extra labels and samples.
pub fn series(metric: &str, labels: &[(&str, &str)], samples: &[(i64, f64)]) -> TimeSeries {
    let mut all_labels = vec![Label::new(METRIC_NAME_LABEL, metric)];
    all_labels.extend(labels.iter().map(|(name, value)| Label::new(*name, *value)));
    TimeSeries {
        labels: all_labels,
        samples: samples
            .iter()
            .map(|&(timestamp_ms, value)| Sample {
                timestamp_ms,
                value,
            })
            .collect(),
    }
}

/// A series with no metric-name label, which the write path must reject.
pub fn series_without_name(labels: &[(&str, &str)], samples: &[(i64, f64)]) -> TimeSeries {
    series_with(labels, samples)
}

fn series_with(labels: &[(&str, &str)], samples: &[(i64, f64)]) -> TimeSeries {
    TimeSeries {
        labels: labels
            .iter()
            .map(|(name, value)| Label::new(*name, *value))
            .collect(),
        samples: samples
            .iter()
            .map(|&(timestamp_ms, value)| Sample {
                timestamp_ms,
                value,
            })
            .collect(),
    }
}

/// A distributor wired to mock ingesters behind a static ring.
pub struct TestCluster {
    pub registry: Registry,
    pub ring: Arc<StaticRing>,
    pub connector: Arc<MockConnector>,
    pub ingesters: Vec<Arc<MockIngester>>,
    pub distributor: Distributor,
}

pub fn cluster(members: &[(&str, bool)]) -> TestCluster {
    cluster_with_config(members, DistributorConfig::default())
}

/// `members` pairs an address with whether its heartbeat is fresh.
pub fn cluster_with_config(members: &[(&str, bool)], cfg: DistributorConfig) -> TestCluster {
    let connector = Arc::new(MockConnector::default());
    let mut descs = Vec::new();
    let mut ingesters = Vec::new();
    for (address, live) in members {
        ingesters.push(connector.register(address));
        descs.push(if *live {
            live_desc(address)
        } else {
            stale_desc(address)
        });
    }
    let ring = Arc::new(StaticRing::new(descs));
    let registry = Registry::new();
    let distributor = Distributor::new(cfg, ring.clone(), connector.clone(), &registry)
        .expect("distributor construction");
    TestCluster {
        registry,
        ring,
        connector,
        ingesters,
        distributor,
    }
}

/// Reads a counter (optionally filtered by one label pair) from a scrape.
pub fn counter_value(registry: &Registry, name: &str, label: Option<(&str, &str)>) -> u64 {
    for family in registry.gather() {
        if family.get_name() != name {
            continue;
        }
        for metric in family.get_metric() {
            let matched = match label {
                None => true,
                Some((key, value)) => metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.get_name() == key && pair.get_value() == value),
            };
            if matched {
                return metric.get_counter().get_value() as u64;
            }
        }
    }
    0
}

/// Reads a gauge value from a scrape.
pub fn gauge_value(registry: &Registry, name: &str) -> i64 {
    for family in registry.gather() {
        if family.get_name() == name {
            if let Some(metric) = family.get_metric().first() {
                return metric.get_gauge().get_value() as i64;
            }
        }
    }
    0
}
