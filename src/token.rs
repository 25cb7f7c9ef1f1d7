//! Ring token derivation
//!
//! A series' ring position is the FNV-1a-32 hash of the tenant id followed
//! directly by the metric name bytes. There is deliberately no separator:
//! the token determines which ingesters own which series, so the exact byte
//! stream is wire-observable and must stay stable across versions.

use crate::model::{metric_name, Label};
use crate::{Error, Result};

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

fn fnv1a32(parts: &[&[u8]]) -> u32 {
    let mut h = FNV32_OFFSET;
    for part in parts {
        for &b in *part {
            h ^= u32::from(b);
            h = h.wrapping_mul(FNV32_PRIME);
        }
    }
    h
}

/// Map `(tenant, metric name)` to a 32-bit ring token.
///
/// Two series of one tenant sharing a metric name share a token, which
/// co-locates a metric's series on one replica set.
pub fn token_for(tenant_id: &str, metric_name: &[u8]) -> u32 {
    fnv1a32(&[tenant_id.as_bytes(), metric_name])
}

/// Derive the ring token from a series' label set.
///
/// The metric-name label is mandatory; its absence is a client error.
pub fn token_for_labels(tenant_id: &str, labels: &[Label]) -> Result<u32> {
    match metric_name(labels) {
        Some(name) => Ok(token_for(tenant_id, name.as_bytes())),
        None => Err(Error::MissingMetricName),
    }
}
