//! Read path: single-key quorum queries
//!
//! A query routes by the token of its metric-name matcher, fans out to
//! the owning replicas and merges the first quorum of responses by series
//! fingerprint. Responses arriving after the quorum is satisfied are
//! discarded.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::metrics::{observe_duration, DistributorMetrics};
use crate::model::{
    extract_metric_name, fingerprint, merge_samples, Fingerprint, LabelMatcher, Matrix,
    QueryRequest, SampleStream,
};
use crate::pool::IngesterClientPool;
use crate::ring::{IngesterDesc, Operation};
use crate::tenant::RequestContext;
use crate::token::token_for;
use crate::{Error, Result};

use super::Distributor;

impl Distributor {
    /// Evaluates a range query against the replicas owning the queried
    /// metric.
    pub async fn query(
        &self,
        ctx: &RequestContext,
        from_ms: i64,
        through_ms: i64,
        matchers: &[LabelMatcher],
    ) -> Result<Matrix> {
        let start = Instant::now();
        let result = self.query_inner(ctx, from_ms, through_ms, matchers).await;
        observe_duration(
            &self.metrics.query_duration,
            "Distributor.Query",
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }

    async fn query_inner(
        &self,
        ctx: &RequestContext,
        from_ms: i64,
        through_ms: i64,
        matchers: &[LabelMatcher],
    ) -> Result<Matrix> {
        let tenant_id = ctx.tenant_id()?;
        let metric_name = extract_metric_name(matchers)?;

        let req = QueryRequest {
            start_timestamp_ms: from_ms,
            end_timestamp_ms: through_ms,
            matchers: matchers.to_vec(),
        };

        let token = token_for(tenant_id, metric_name.as_bytes());
        let replicas = self
            .ring
            .get(token, self.cfg.replication_factor, Operation::Read)?;
        self.query_ingesters(ctx, replicas, req).await
    }

    async fn query_ingesters(
        &self,
        ctx: &RequestContext,
        replicas: Vec<IngesterDesc>,
        req: QueryRequest,
    ) -> Result<Matrix> {
        let min_success = replicas.len() / 2 + 1;
        let max_errs = replicas.len() - min_success;
        if replicas.len() < min_success {
            return Err(Error::InsufficientReplicas {
                need: min_success,
                have: replicas.len(),
            });
        }

        let (result_tx, mut result_rx) = mpsc::channel(replicas.len());
        let (err_tx, mut err_rx) = mpsc::channel(1);
        let err_count = Arc::new(AtomicUsize::new(0));

        for ingester in replicas {
            let pool = self.pool.clone();
            let metrics = self.metrics.clone();
            let ctx = ctx.clone();
            let req = req.clone();
            let result_tx = result_tx.clone();
            let err_tx = err_tx.clone();
            let err_count = err_count.clone();
            tokio::spawn(async move {
                match query_ingester(&pool, &metrics, &ctx, &ingester, req).await {
                    Ok(matrix) => {
                        let _ = result_tx.send(matrix).await;
                    }
                    Err(err) => {
                        // Only the error crossing the tolerance threshold
                        // is surfaced.
                        if err_count.fetch_add(1, Ordering::SeqCst) + 1 == max_errs + 1 {
                            let _ = err_tx.send(err).await;
                        }
                    }
                }
            });
        }
        drop(result_tx);
        drop(err_tx);

        // Wait for the first `min_success` successful responses, merging
        // streams of the same series as they arrive.
        let mut by_fingerprint: HashMap<Fingerprint, SampleStream> = HashMap::new();
        for _ in 0..min_success {
            tokio::select! {
                Some(err) = err_rx.recv() => return Err(err),
                Some(matrix) = result_rx.recv() => {
                    for stream in matrix {
                        match by_fingerprint.entry(fingerprint(&stream.metric)) {
                            Entry::Occupied(mut entry) => {
                                let merged = merge_samples(&entry.get().samples, &stream.samples);
                                entry.get_mut().samples = merged;
                            }
                            Entry::Vacant(entry) => {
                                entry.insert(stream);
                            }
                        }
                    }
                }
                else => return Err(Error::QuorumNotReached),
            }
        }

        Ok(by_fingerprint.into_values().collect())
    }
}

async fn query_ingester(
    pool: &IngesterClientPool,
    metrics: &DistributorMetrics,
    ctx: &RequestContext,
    ingester: &IngesterDesc,
    req: QueryRequest,
) -> Result<Matrix> {
    let client = pool.get(&ingester.address).await?;

    let response = client.query(ctx, req).await;
    metrics
        .ingester_queries
        .with_label_values(&[ingester.address.as_str()])
        .inc();
    match response {
        Ok(resp) => Ok(resp.into_matrix()),
        Err(err) => {
            metrics
                .ingester_query_failures
                .with_label_values(&[ingester.address.as_str()])
                .inc();
            Err(err)
        }
    }
}
