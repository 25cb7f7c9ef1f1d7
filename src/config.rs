//! Distributor configuration

use std::time::Duration;

use crate::{Error, Result};

/// Configuration for a [`crate::Distributor`].
#[derive(Debug, Clone)]
pub struct DistributorConfig {
    /// Number of ingesters to write to and read from.
    pub replication_factor: usize,
    /// Heartbeat staleness after which an ingester is skipped for
    /// reads/writes.
    pub heartbeat_timeout: Duration,
    /// Connection-establishment timeout for new pooled clients.
    pub remote_timeout: Duration,
    /// How frequently to clean up clients for ingesters that have gone
    /// away.
    pub client_cleanup_period: Duration,
    /// Per-tenant ingestion rate limit in samples per second.
    pub ingestion_rate_limit: f64,
    /// Per-tenant allowed ingestion burst size, in samples.
    pub ingestion_burst_size: usize,
    /// How long a tenant's rate limiter may sit unused before the
    /// maintenance loop drops it.
    pub limiter_idle_timeout: Duration,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            replication_factor: 3,
            heartbeat_timeout: Duration::from_secs(60),
            remote_timeout: Duration::from_secs(2),
            client_cleanup_period: Duration::from_secs(15),
            ingestion_rate_limit: 25_000.0,
            ingestion_burst_size: 50_000,
            limiter_idle_timeout: Duration::from_secs(600),
        }
    }
}

impl DistributorConfig {
    /// Validates construction-time invariants.
    ///
    /// A replication factor of zero would make every quorum trivially
    /// satisfied and the user-stats division undefined, so it is rejected
    /// here rather than at first use.
    pub fn validate(&self) -> Result<()> {
        if self.replication_factor == 0 {
            return Err(Error::Config(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        if self.ingestion_rate_limit <= 0.0 {
            return Err(Error::Config(
                "ingestion_rate_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
