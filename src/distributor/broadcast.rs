//! Broadcast reads: operations with no routing key
//!
//! Label enumeration, metric discovery and tenant statistics have no
//! series token, so they fan out to every ingester in the ring. Up to
//! ⌊RF/2⌋ failures are absorbed; beyond that the last observed error is
//! returned.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::client::IngesterClient;
use crate::model::{
    fingerprint, Fingerprint, Label, LabelMatcher, LabelValuesRequest,
    MetricsForLabelMatchersRequest, UserStats, UserStatsRequest,
};
use crate::tenant::RequestContext;
use crate::Result;

use super::Distributor;

impl Distributor {
    /// Runs `f` against every ingester in the ring concurrently,
    /// tolerating up to ⌊RF/2⌋ failures.
    async fn for_all_ingesters<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn IngesterClient>) -> BoxFuture<'static, Result<T>>
            + Send
            + Sync
            + Clone
            + 'static,
    {
        let ingesters = self.ring.all();
        let (result_tx, mut result_rx) = mpsc::channel(ingesters.len().max(1));
        let (err_tx, mut err_rx) = mpsc::channel(ingesters.len().max(1));

        for ingester in &ingesters {
            let pool = self.pool.clone();
            let address = ingester.address.clone();
            let f = f.clone();
            let result_tx = result_tx.clone();
            let err_tx = err_tx.clone();
            tokio::spawn(async move {
                match pool.get(&address).await {
                    Err(err) => {
                        let _ = err_tx.send(err).await;
                    }
                    Ok(client) => match f(client).await {
                        Ok(resp) => {
                            let _ = result_tx.send(resp).await;
                        }
                        Err(err) => {
                            let _ = err_tx.send(err).await;
                        }
                    },
                }
            });
        }
        drop(result_tx);
        drop(err_tx);

        let mut results = Vec::with_capacity(ingesters.len());
        let mut num_errs = 0;
        let mut last_err = None;
        for _ in 0..ingesters.len() {
            tokio::select! {
                Some(resp) = result_rx.recv() => results.push(resp),
                Some(err) = err_rx.recv() => {
                    num_errs += 1;
                    last_err = Some(err);
                }
                else => break,
            }
        }
        if num_errs > self.cfg.replication_factor / 2 {
            if let Some(err) = last_err {
                return Err(err);
            }
        }
        Ok(results)
    }

    /// All values observed for one label name, across the whole ring.
    pub async fn label_values(
        &self,
        ctx: &RequestContext,
        label_name: &str,
    ) -> Result<Vec<String>> {
        let req = LabelValuesRequest {
            label_name: label_name.to_string(),
        };
        let ctx = ctx.clone();
        let responses = self
            .for_all_ingesters(move |client| {
                let ctx = ctx.clone();
                let req = req.clone();
                async move { client.label_values(&ctx, req).await }.boxed()
            })
            .await?;

        let mut values = BTreeSet::new();
        for resp in responses {
            values.extend(resp.label_values);
        }
        Ok(values.into_iter().collect())
    }

    /// The label sets of every metric matching any of the matcher sets.
    /// Replicated series collapse onto one entry by fingerprint.
    pub async fn metrics_for_label_matchers(
        &self,
        ctx: &RequestContext,
        from_ms: i64,
        through_ms: i64,
        matchers_sets: &[Vec<LabelMatcher>],
    ) -> Result<Vec<Vec<Label>>> {
        let req = MetricsForLabelMatchersRequest {
            start_timestamp_ms: from_ms,
            end_timestamp_ms: through_ms,
            matchers_sets: matchers_sets.to_vec(),
        };
        let ctx = ctx.clone();
        let responses = self
            .for_all_ingesters(move |client| {
                let ctx = ctx.clone();
                let req = req.clone();
                async move { client.metrics_for_label_matchers(&ctx, req).await }.boxed()
            })
            .await?;

        let mut by_fingerprint: HashMap<Fingerprint, Vec<Label>> = HashMap::new();
        for resp in responses {
            for metric in resp.metrics {
                by_fingerprint.insert(fingerprint(&metric), metric);
            }
        }
        Ok(by_fingerprint.into_values().collect())
    }

    /// Aggregated ingest statistics for the calling tenant. Every replica
    /// reports the same series, so the sums are divided by the
    /// replication factor to recover the per-tenant estimate.
    pub async fn user_stats(&self, ctx: &RequestContext) -> Result<UserStats> {
        let ctx = ctx.clone();
        let responses = self
            .for_all_ingesters(move |client| {
                let ctx = ctx.clone();
                async move { client.user_stats(&ctx, UserStatsRequest::default()).await }.boxed()
            })
            .await?;

        let mut totals = UserStats::default();
        for resp in responses {
            totals.ingestion_rate += resp.ingestion_rate;
            totals.num_series += resp.num_series;
        }
        totals.ingestion_rate /= self.cfg.replication_factor as f64;
        totals.num_series /= self.cfg.replication_factor as u64;
        Ok(totals)
    }
}
