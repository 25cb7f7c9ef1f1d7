//! Tenant identity attached to each call
//!
//! Authentication happens upstream; by the time a request reaches the
//! distributor its tenant id is either present on the context or the call
//! is unauthenticated.

use crate::{Error, Result};

/// Per-call context carrying the tenant identity extracted by upstream
/// middleware.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    tenant_id: Option<String>,
}

impl RequestContext {
    /// Context for an authenticated tenant.
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
        }
    }

    /// Context with no tenant attached. Every tenant-scoped operation
    /// fails on it.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The tenant this call acts for.
    pub fn tenant_id(&self) -> Result<&str> {
        self.tenant_id.as_deref().ok_or(Error::Unauthenticated)
    }
}
