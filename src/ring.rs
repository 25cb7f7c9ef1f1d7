//! Read interface to the membership ring
//!
//! Ring membership and token ownership live in an external service; the
//! distributor only consumes its view: replica lookups by token and
//! enumeration of the current members.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// The operation a replica lookup is for. Rings may answer reads and
/// writes with different replica sets during hand-over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Read,
    Write,
}

/// Descriptor of one ingester as the ring sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngesterDesc {
    /// Stable dial address; also the client-pool key.
    pub address: String,
    /// Unix seconds of the ingester's last heartbeat.
    pub heartbeat_timestamp: i64,
    /// Ring tokens owned by this ingester. Opaque to the distributor.
    pub tokens: Vec<u32>,
}

impl IngesterDesc {
    /// Whether the ingester heartbeated recently enough to be sent traffic.
    pub fn is_live(&self, now_unix: i64, heartbeat_timeout: Duration) -> bool {
        now_unix - self.heartbeat_timestamp <= heartbeat_timeout.as_secs() as i64
    }
}

/// An ordered replica set for one token, at most the replication factor
/// long.
pub type ReplicaSet = Vec<IngesterDesc>;

/// The distributor's view of the ring.
pub trait ReplicaRing: Send + Sync {
    /// Replicas owning `token` for the given operation.
    fn get(&self, token: u32, n: usize, op: Operation) -> Result<ReplicaSet>;

    /// Replica lookup for a batch of tokens, one set per token in order.
    fn batch_get(&self, tokens: &[u32], n: usize, op: Operation) -> Result<Vec<ReplicaSet>>;

    /// Every ingester currently in the ring.
    fn all(&self) -> Vec<IngesterDesc>;
}
