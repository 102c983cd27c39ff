//! Per-request tenant context.
//!
//! The isolation middleware resolves the tenant once and stores a
//! [`RequestContext`] in the request extensions. Handlers take the
//! [`CurrentTenant`] extractor, which only reads that extension, so a
//! handler can never observe a tenant the middleware did not vet.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use bazaar_core::tenant::{ResolutionMethod, Tenant, TenantId};

/// Tenant context attached to a request after it passes the isolation
/// gate. Lives in the request extensions, never in task-local or
/// global state, so concurrent requests cannot bleed into each other.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant: Tenant,
    pub method: ResolutionMethod,
}

impl RequestContext {
    pub fn new(tenant: Tenant, method: ResolutionMethod) -> Self {
        Self { tenant, method }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant.id
    }
}

/// Extractor handlers use to get the vetted tenant.
#[derive(Debug, Clone)]
pub struct CurrentTenant(pub RequestContext);

#[derive(Debug, thiserror::Error)]
#[error("request reached a handler without tenant context")]
pub struct MissingContext;

impl IntoResponse for MissingContext {
    fn into_response(self) -> Response {
        // Only reachable if a tenant-scoped route was registered
        // outside the isolation middleware. Treat as a server bug.
        tracing::error!("handler invoked without tenant context");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "tenant context missing", "code": "no_tenant_context" })),
        )
            .into_response()
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = MissingContext;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .map(CurrentTenant)
            .ok_or(MissingContext)
    }
}
