//! Outgoing RPC surface of an ingester
//!
//! The wire schema and transport are owned by the deployment; the
//! distributor talks to ingesters through this trait and obtains
//! connections through a caller-supplied connector. Tests substitute both.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{
    LabelValuesRequest, LabelValuesResponse, MetricsForLabelMatchersRequest,
    MetricsForLabelMatchersResponse, QueryRequest, QueryResponse, UserStatsRequest,
    UserStatsResponse, WriteRequest,
};
use crate::tenant::RequestContext;
use crate::Result;

/// The five unary calls the distributor issues against an ingester.
#[async_trait]
pub trait IngesterClient: Send + Sync {
    async fn push(&self, ctx: &RequestContext, req: WriteRequest) -> Result<()>;

    async fn query(&self, ctx: &RequestContext, req: QueryRequest) -> Result<QueryResponse>;

    async fn label_values(
        &self,
        ctx: &RequestContext,
        req: LabelValuesRequest,
    ) -> Result<LabelValuesResponse>;

    async fn metrics_for_label_matchers(
        &self,
        ctx: &RequestContext,
        req: MetricsForLabelMatchersRequest,
    ) -> Result<MetricsForLabelMatchersResponse>;

    async fn user_stats(
        &self,
        ctx: &RequestContext,
        req: UserStatsRequest,
    ) -> Result<UserStatsResponse>;

    /// Tear down the underlying connection. Called off the pool lock when
    /// an address leaves the ring.
    async fn close(&self) {}
}

/// Establishes a client for an ingester address.
///
/// The production connector dials the ingester's RPC endpoint with the
/// tenant-header and trace-propagation interceptors of the deployment;
/// tests hand out scripted in-memory clients.
#[async_trait]
pub trait IngesterConnector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn IngesterClient>>;
}
