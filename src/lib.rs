//! # Meridian Distributor
//!
//! The stateless front end of a horizontally-scaled, multi-tenant
//! time-series database. Writers push batches of samples; the distributor
//! shards each sample across a replicated set of ingesters by consistent
//! hash, enforces per-tenant admission and acknowledges on write quorum.
//! Readers issue label-matcher queries; the distributor fans out to the
//! replicas owning the series and merges their responses.
//!
//! ## Key pieces
//!
//! - **Token derivation**: a series' ring position is the FNV-1a-32 hash
//!   of its tenant id and metric name, co-locating a metric's series on
//!   one replica set
//! - **Client pool**: one long-lived client per ingester address, pruned
//!   when the address leaves the ring
//! - **Quorum tracking**: per-sample atomic counters let concurrent
//!   sub-batch workers agree on exactly one request outcome
//! - **Admission**: a lazily-created token bucket per tenant
//!
//! ## Collaborators
//!
//! Ring membership, the ingesters themselves, the wire transport and the
//! hosting server are external; the distributor consumes them through the
//! [`ring::ReplicaRing`], [`client::IngesterClient`] and
//! [`client::IngesterConnector`] traits.

pub mod client;
pub mod config;
pub mod distributor;
pub mod error;
pub mod metrics;
pub mod model;
pub mod pool;
pub mod rate_limit;
pub mod ring;
pub mod tenant;
pub mod token;

pub use config::DistributorConfig;
pub use distributor::Distributor;
pub use error::{Error, Result};
pub use tenant::RequestContext;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::client::{IngesterClient, IngesterConnector};
    pub use crate::model::{Label, LabelMatcher, Matrix, Sample, TimeSeries, WriteRequest};
    pub use crate::ring::{IngesterDesc, Operation, ReplicaRing};
    pub use crate::{Distributor, DistributorConfig, Error, RequestContext, Result};
}
