//! Error types for the distributor

/// Result type alias for distributor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the distributor
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No tenant identity attached to the request context
    #[error("no tenant id on request")]
    Unauthenticated,
    /// A series or query carries no metric name label
    #[error("no metric name label")]
    MissingMetricName,
    /// Per-tenant ingestion admission denied
    #[error("ingestion rate limit exceeded for tenant {tenant_id}: {limit} samples/s")]
    RateLimitExceeded { tenant_id: String, limit: f64 },
    /// Fewer live replicas than the quorum requires
    #[error("need at least {need} live ingesters, have {have}")]
    InsufficientReplicas { need: usize, have: usize },
    /// The membership ring could not answer a replica lookup
    #[error("ring lookup failed: {0}")]
    Ring(String),
    /// An ingester RPC or dial failed
    #[error("ingester {ingester}: {message}")]
    Upstream { ingester: String, message: String },
    /// Every replica responded but no quorum threshold was crossed
    #[error("replica responses exhausted before a quorum decision")]
    QuorumNotReached,
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
    /// Metric registration errors
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Wrap an upstream transport failure from a specific ingester.
    pub fn upstream(ingester: impl Into<String>, message: impl ToString) -> Self {
        Error::Upstream {
            ingester: ingester.into(),
            message: message.to_string(),
        }
    }
}
