//! Core data model shared by the write and read paths
//!
//! Series are label sets with samples attached. The distributor never
//! interprets label values beyond the metric name; it routes, replicates
//! and merges them.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The well-known label holding a series' metric name.
pub const METRIC_NAME_LABEL: &str = "__name__";

/// A label name/value pair. Equality is byte-exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A single measurement: milliseconds since epoch plus a value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// One label set with zero or more samples sharing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

/// A batch of series pushed by one tenant in one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub timeseries: Vec<TimeSeries>,
}

/// A queried series: its label set and the samples in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleStream {
    pub metric: Vec<Label>,
    pub samples: Vec<Sample>,
}

/// Unordered collection of sample streams, one per distinct series.
pub type Matrix = Vec<SampleStream>;

/// Stable identity of a label set, independent of label ordering.
pub type Fingerprint = u64;

/// Hash a label set into its fingerprint.
///
/// Label order is preserved on the wire but carries no meaning, so the
/// pairs are sorted before hashing. FNV-1a-64 with a separator byte after
/// each component keeps `{a="bc"}` and `{ab="c"}` distinct.
pub fn fingerprint(labels: &[Label]) -> Fingerprint {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut sorted: Vec<&Label> = labels.iter().collect();
    sorted.sort_by(|a, b| (&a.name, &a.value).cmp(&(&b.name, &b.value)));

    let mut h = OFFSET;
    let mut write = |bytes: &[u8]| {
        for &b in bytes {
            h ^= u64::from(b);
            h = h.wrapping_mul(PRIME);
        }
    };
    for label in sorted {
        write(label.name.as_bytes());
        write(&[0xff]);
        write(label.value.as_bytes());
        write(&[0xff]);
    }
    h
}

/// Returns the metric name of a label set, if present.
pub fn metric_name(labels: &[Label]) -> Option<&str> {
    labels
        .iter()
        .find(|l| l.name == METRIC_NAME_LABEL)
        .map(|l| l.value.as_str())
}

/// How a matcher compares a label value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    Equal,
    NotEqual,
    RegexMatch,
    RegexNoMatch,
}

/// A label constraint attached to a query. The distributor forwards
/// matchers verbatim; only the metric-name equality matcher is inspected
/// for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMatcher {
    pub match_type: MatchType,
    pub name: String,
    pub value: String,
}

impl LabelMatcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::Equal,
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Finds the equality matcher on the metric-name label, which determines
/// the ring token a query routes by.
pub fn extract_metric_name(matchers: &[LabelMatcher]) -> Result<&str> {
    matchers
        .iter()
        .find(|m| m.match_type == MatchType::Equal && m.name == METRIC_NAME_LABEL)
        .map(|m| m.value.as_str())
        .ok_or(Error::MissingMetricName)
}

/// Merge two timestamp-ordered sample lists into one.
///
/// On a timestamp collision the sample from `a` wins and the one from `b`
/// is dropped, so replaying overlapping replica responses is idempotent.
pub fn merge_samples(a: &[Sample], b: &[Sample]) -> Vec<Sample> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].timestamp_ms < b[j].timestamp_ms {
            result.push(a[i]);
            i += 1;
        } else if a[i].timestamp_ms > b[j].timestamp_ms {
            result.push(b[j]);
            j += 1;
        } else {
            result.push(a[i]);
            i += 1;
            j += 1;
        }
    }
    result.extend_from_slice(&a[i..]);
    result.extend_from_slice(&b[j..]);
    result
}

/// Range query sent to the replicas owning a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub start_timestamp_ms: i64,
    pub end_timestamp_ms: i64,
    pub matchers: Vec<LabelMatcher>,
}

/// One replica's answer to a range query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub timeseries: Vec<TimeSeries>,
}

impl QueryResponse {
    /// Reshape the wire response into a matrix of sample streams.
    pub fn into_matrix(self) -> Matrix {
        self.timeseries
            .into_iter()
            .map(|ts| SampleStream {
                metric: ts.labels,
                samples: ts.samples,
            })
            .collect()
    }
}

/// Broadcast request for all values of one label name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelValuesRequest {
    pub label_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelValuesResponse {
    pub label_values: Vec<String>,
}

/// Broadcast request for the metrics matching any of several matcher sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsForLabelMatchersRequest {
    pub start_timestamp_ms: i64,
    pub end_timestamp_ms: i64,
    pub matchers_sets: Vec<Vec<LabelMatcher>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsForLabelMatchersResponse {
    pub metrics: Vec<Vec<Label>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatsRequest {}

/// One ingester's view of a tenant's ingest load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStatsResponse {
    pub ingestion_rate: f64,
    pub num_series: u64,
}

/// Aggregated per-tenant statistics, corrected for replication.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserStats {
    pub ingestion_rate: f64,
    pub num_series: u64,
}
