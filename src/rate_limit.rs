//! Per-tenant ingestion admission
//!
//! A token bucket per tenant, created lazily on the tenant's first write.
//! Admission is all-or-nothing: a request either finds tokens for every
//! sample it carries or is rejected whole.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Token bucket with fractional accounting.
///
/// The caller supplies the observation instant, so admission decisions are
/// reproducible in tests without sleeping.
#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens added per second.
    rate: f64,
    /// Bucket capacity.
    burst: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket refilling at `rate` tokens per second.
    pub fn new(rate: f64, burst: usize) -> Self {
        Self {
            rate,
            burst: burst as f64,
            state: Mutex::new(BucketState {
                tokens: burst as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Deducts `n` tokens if available at `now`; returns whether it did.
    pub fn allow_n(&self, now: Instant, n: usize) -> bool {
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_refill);
        state.tokens = (state.tokens + elapsed.as_secs_f64() * self.rate).min(self.burst);
        if now > state.last_refill {
            state.last_refill = now;
        }

        let wanted = n as f64;
        if state.tokens >= wanted {
            state.tokens -= wanted;
            true
        } else {
            false
        }
    }

    /// Instant of the bucket's last refill, which advances on every
    /// admission check. Doubles as the tenant's last-access mark.
    pub fn last_access(&self) -> Instant {
        self.state.lock().last_refill
    }
}

/// Registry of per-tenant ingestion limiters.
pub struct IngestLimiters {
    buckets: DashMap<String, std::sync::Arc<TokenBucket>>,
    rate: f64,
    burst: usize,
}

impl IngestLimiters {
    pub fn new(rate: f64, burst: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            rate,
            burst,
        }
    }

    /// Asks the tenant's bucket for `n` tokens at `now`, creating the
    /// bucket on the tenant's first write.
    pub fn allow(&self, tenant_id: &str, n: usize, now: Instant) -> bool {
        let bucket = self
            .buckets
            .entry(tenant_id.to_string())
            .or_insert_with(|| std::sync::Arc::new(TokenBucket::new(self.rate, self.burst)))
            .clone();
        bucket.allow_n(now, n)
    }

    /// Drops buckets that have not been consulted within `idle`, bounding
    /// registry growth under a churning tenant population.
    pub fn prune_idle(&self, now: Instant, idle: Duration) {
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_access()) <= idle);
    }

    /// Number of tenants currently tracked.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The configured per-tenant rate, surfaced in rejection errors.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}
