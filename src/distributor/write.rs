//! Write path: flatten, shard, fan out, track quorum
//!
//! Every sample is tracked independently against its own replica set. One
//! sample usually belongs to several ingesters' sub-batches at once, so
//! the per-sample counters are atomics and each threshold is crossed by
//! exactly one worker, which makes that worker the single signaller for
//! the transition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::metrics::{observe_duration, DistributorMetrics};
use crate::model::{Label, Sample, TimeSeries, WriteRequest};
use crate::pool::IngesterClientPool;
use crate::ring::{IngesterDesc, Operation};
use crate::tenant::RequestContext;
use crate::token::token_for_labels;
use crate::{Error, Result};

use super::Distributor;

/// Per-sample write state. `succeeded`/`failed` are bumped by every
/// worker whose sub-batch contains the sample.
struct SampleTracker {
    labels: Vec<Label>,
    sample: Sample,
    min_success: usize,
    max_failures: usize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

/// Per-request write state shared by all sub-batch workers.
struct PushState {
    samples_pending: AtomicI64,
    samples_failed: AtomicUsize,
    outcome: mpsc::Sender<Result<()>>,
}

impl Distributor {
    /// Pushes a tenant's batch of series, acknowledging once every sample
    /// reached write quorum on its replica set.
    pub async fn push(&self, ctx: &RequestContext, req: WriteRequest) -> Result<()> {
        let tenant_id = ctx.tenant_id()?.to_string();

        // Flatten the request into per-sample entries and derive each
        // series' ring token in the same pass.
        let mut keys = Vec::with_capacity(req.timeseries.len());
        let mut flattened = Vec::with_capacity(req.timeseries.len());
        for series in req.timeseries {
            let key = token_for_labels(&tenant_id, &series.labels)?;
            for sample in series.samples {
                keys.push(key);
                flattened.push((series.labels.clone(), sample));
            }
        }
        self.metrics.received_samples.inc_by(flattened.len() as u64);
        if flattened.is_empty() {
            return Ok(());
        }

        // Admission is all-or-nothing for the whole request.
        if !self
            .limiters
            .allow(&tenant_id, flattened.len(), Instant::now())
        {
            return Err(Error::RateLimitExceeded {
                tenant_id,
                limit: self.cfg.ingestion_rate_limit,
            });
        }

        let lookup_start = Instant::now();
        let replica_sets = self
            .ring
            .batch_get(&keys, self.cfg.replication_factor, Operation::Write)?;
        debug!(
            keys = keys.len(),
            elapsed_us = lookup_start.elapsed().as_micros() as u64,
            "ring lookup"
        );

        let now_unix = Utc::now().timestamp();
        let mut total_samples = 0usize;
        let mut by_ingester: HashMap<String, (IngesterDesc, Vec<Arc<SampleTracker>>)> =
            HashMap::new();
        for ((labels, sample), replicas) in flattened.into_iter().zip(replica_sets) {
            // Quorum thresholds come from the unfiltered replica set:
            // a stale replica counts as a failure, not as absent, so the
            // quorum never silently shrinks when replicas are down.
            let min_success = replicas.len() / 2 + 1;
            let max_failures = replicas.len() - min_success;

            let live: Vec<&IngesterDesc> = replicas
                .iter()
                .filter(|desc| desc.is_live(now_unix, self.cfg.heartbeat_timeout))
                .collect();
            if live.len() < min_success {
                return Err(Error::InsufficientReplicas {
                    need: min_success,
                    have: live.len(),
                });
            }

            let tracker = Arc::new(SampleTracker {
                labels,
                sample,
                min_success,
                max_failures,
                succeeded: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            });
            for replica in live {
                by_ingester
                    .entry(replica.address.clone())
                    .or_insert_with(|| (replica.clone(), Vec::new()))
                    .1
                    .push(tracker.clone());
            }
            total_samples += 1;
        }

        let (outcome_tx, mut outcome_rx) = mpsc::channel(2);
        let state = Arc::new(PushState {
            samples_pending: AtomicI64::new(total_samples as i64),
            samples_failed: AtomicUsize::new(0),
            outcome: outcome_tx,
        });

        for (_, (ingester, sub_batch)) in by_ingester {
            tokio::spawn(send_samples(
                self.pool.clone(),
                self.metrics.clone(),
                ctx.clone(),
                ingester,
                sub_batch,
                state.clone(),
            ));
        }
        drop(state);

        // First verdict wins. Workers finishing later update counters
        // nobody reads anymore, which is harmless. The channel closing
        // with no verdict means every worker finished without any sample
        // crossing either threshold.
        match outcome_rx.recv().await {
            Some(result) => result,
            None => Err(Error::QuorumNotReached),
        }
    }
}

/// Sends one ingester's sub-batch and applies the result to every sample
/// tracker in it.
async fn send_samples(
    pool: Arc<IngesterClientPool>,
    metrics: Arc<DistributorMetrics>,
    ctx: RequestContext,
    ingester: IngesterDesc,
    trackers: Vec<Arc<SampleTracker>>,
    state: Arc<PushState>,
) {
    let error = send_samples_err(&pool, &metrics, &ctx, &ingester, &trackers)
        .await
        .err();
    record_send_outcome(&trackers, &state, error);
}

/// Applies a sub-batch outcome to its trackers.
///
/// The fetch-and-add results make exactly one worker observe each
/// threshold crossing, so at most one worker sends the request error and
/// at most one sends the completion.
fn record_send_outcome(
    trackers: &[Arc<SampleTracker>],
    state: &PushState,
    mut error: Option<Error>,
) {
    let failed = error.is_some();
    for tracker in trackers {
        if failed {
            if tracker.failed.fetch_add(1, Ordering::SeqCst) + 1 <= tracker.max_failures {
                continue;
            }
            if state.samples_failed.fetch_add(1, Ordering::SeqCst) == 0 {
                if let Some(error) = error.take() {
                    let _ = state.outcome.try_send(Err(error));
                }
            }
        } else {
            if tracker.succeeded.fetch_add(1, Ordering::SeqCst) + 1 != tracker.min_success {
                continue;
            }
            if state.samples_pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                let _ = state.outcome.try_send(Ok(()));
            }
        }
    }
}

async fn send_samples_err(
    pool: &IngesterClientPool,
    metrics: &DistributorMetrics,
    ctx: &RequestContext,
    ingester: &IngesterDesc,
    trackers: &[Arc<SampleTracker>],
) -> Result<()> {
    let client = pool.get(&ingester.address).await?;

    // One wire series per tracker: each sample travels with its own label
    // list, without re-grouping by label set.
    let req = WriteRequest {
        timeseries: trackers
            .iter()
            .map(|tracker| TimeSeries {
                labels: tracker.labels.clone(),
                samples: vec![tracker.sample],
            })
            .collect(),
    };

    let start = Instant::now();
    let result = client.push(ctx, req).await;
    observe_duration(
        &metrics.send_duration,
        "Distributor.sendSamples",
        result.is_ok(),
        start.elapsed().as_secs_f64(),
    );

    metrics
        .ingester_appends
        .with_label_values(&[ingester.address.as_str()])
        .inc();
    if result.is_err() {
        metrics
            .ingester_append_failures
            .with_label_values(&[ingester.address.as_str()])
            .inc();
    }
    result
}
