//! Tenant resolution from request credentials.
//!
//! A request may identify its tenant three ways, tried in order:
//! a tenant claim inside a bearer token, the `X-Tenant` header, or
//! the `Host` the request arrived on. The first source that names a
//! known tenant wins; later sources are not consulted.

pub mod cache;

use std::sync::Arc;

use axum::http::HeaderMap;

use bazaar_core::tenant::{ResolutionMethod, Tenant};

use crate::auth::JwtConfig;
use crate::config::TENANT_HEADER;
use crate::db::{StoreError, TenantDirectory};
use cache::{CacheOutcome, TenantCache};

/// Outcome of resolving a request to a tenant.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A known, active tenant.
    Resolved {
        tenant: Tenant,
        method: ResolutionMethod,
    },
    /// The request named a real tenant whose account is deactivated.
    /// Resolution stops here; weaker sources are not tried.
    Inactive(Tenant),
    /// No source named a known tenant.
    NotFound,
}

pub struct TenantResolver {
    directory: Arc<dyn TenantDirectory>,
    cache: Arc<TenantCache>,
    jwt: JwtConfig,
}

impl TenantResolver {
    pub fn new(directory: Arc<dyn TenantDirectory>, cache: Arc<TenantCache>, jwt: JwtConfig) -> Self {
        Self {
            directory,
            cache,
            jwt,
        }
    }

    /// Resolve the tenant for a request. Directory failures propagate so
    /// the caller can fail closed rather than treat an outage as an
    /// unknown tenant.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<Resolution, StoreError> {
        if let Some(claim) = self.token_claim(headers) {
            if let Some(resolution) = self.lookup(ResolutionMethod::Token, &claim).await? {
                return Ok(resolution);
            }
        }

        if let Some(name) = header_value(headers, TENANT_HEADER) {
            if let Some(resolution) = self.lookup(ResolutionMethod::Header, &name).await? {
                return Ok(resolution);
            }
        }

        if let Some(host) = request_host(headers) {
            if let Some(resolution) = self.lookup(ResolutionMethod::Domain, &host).await? {
                return Ok(resolution);
            }
        }

        Ok(Resolution::NotFound)
    }

    fn token_claim(&self, headers: &HeaderMap) -> Option<String> {
        let authorization = headers.get("authorization")?.to_str().ok()?;
        self.jwt.tenant_claim(authorization)
    }

    /// Consult the cache for one source, falling back to the directory
    /// on a miss. A directory miss is remembered with the shorter
    /// negative TTL so repeated probes for bogus names stay cheap.
    async fn lookup(
        &self,
        method: ResolutionMethod,
        key: &str,
    ) -> Result<Option<Resolution>, StoreError> {
        let namespace = method.cache_namespace();
        match self.cache.get(namespace, key).await {
            CacheOutcome::Hit(tenant) => return Ok(Some(classify(tenant, method))),
            CacheOutcome::HitNegative => return Ok(None),
            CacheOutcome::Miss => {}
        }

        let found = match method {
            ResolutionMethod::Token => self.directory.find_by_name_or_domain(key).await?,
            ResolutionMethod::Header => self.directory.find_by_name(key).await?,
            ResolutionMethod::Domain => self.directory.find_by_host(key).await?,
        };

        match found {
            Some(tenant) => {
                self.cache.put(namespace, key, tenant.clone()).await;
                tracing::debug!(
                    tenant = %tenant.name,
                    method = %method,
                    "tenant resolved from directory"
                );
                Ok(Some(classify(tenant, method)))
            }
            None => {
                self.cache.put_negative(namespace, key).await;
                Ok(None)
            }
        }
    }
}

fn classify(tenant: Tenant, method: ResolutionMethod) -> Resolution {
    if tenant.is_active {
        Resolution::Resolved { tenant, method }
    } else {
        Resolution::Inactive(tenant)
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
}

/// The host the request was addressed to, lowercased with any port
/// stripped. IPv6 literals keep their brackets and never match a
/// tenant domain, which is the behavior we want.
fn request_host(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("host")?.to_str().ok()?.trim();
    if raw.is_empty() {
        return None;
    }
    let without_port = if raw.starts_with('[') {
        raw.split(']').next().map(|s| format!("{s}]")).unwrap_or_else(|| raw.to_string())
    } else {
        raw.split(':').next().unwrap_or(raw).to_string()
    };
    Some(without_port.to_ascii_lowercase())
}
