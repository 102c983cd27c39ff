//! Tenant domain model.
//!
//! A tenant is one isolated business client. Tenant names and domains are
//! each globally unique, and every catalog/order record carries an
//! immutable reference back to exactly one tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("tenant name cannot be empty")]
    EmptyName,
    #[error("tenant name contains invalid characters: {0}")]
    InvalidName(String),
    #[error("tenant domain cannot be empty")]
    EmptyDomain,
    #[error("tenant not found: {0}")]
    NotFound(TenantId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self, TenantError> {
        let uuid = Uuid::parse_str(s).map_err(|_| TenantError::NotFound(TenantId(Uuid::nil())))?;
        Ok(Self(uuid))
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an inbound request was mapped to its tenant.
///
/// The order here is also the resolution precedence: a valid signed token
/// wins over an explicit header, which wins over the request host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Token,
    Header,
    Domain,
}

impl ResolutionMethod {
    /// Cache key namespace for this lookup kind.
    pub fn cache_namespace(&self) -> &'static str {
        match self {
            ResolutionMethod::Token => "tenant:jwt",
            ResolutionMethod::Header => "tenant:header",
            ResolutionMethod::Domain => "tenant:domain",
        }
    }
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionMethod::Token => write!(f, "token"),
            ResolutionMethod::Header => write!(f, "header"),
            ResolutionMethod::Domain => write!(f, "domain"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    /// Internal name, e.g. `acme-corp`. Unique across the deployment.
    pub name: String,
    /// Full domain or subdomain, e.g. `shop.acme.com`. Unique across the
    /// deployment.
    pub domain: String,
    /// Public-facing business name.
    #[serde(default)]
    pub business_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Inactive tenants never resolve as valid for any isolation check.
    #[serde(default)]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: String, domain: String) -> Result<Self, TenantError> {
        Self::validate_name(&name)?;
        Self::validate_domain(&domain)?;
        let now = Utc::now();
        Ok(Self {
            id: TenantId::new(),
            name,
            domain,
            business_name: String::new(),
            email: String::new(),
            phone: String::new(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_id(mut self, id: TenantId) -> Self {
        self.id = id;
        self
    }

    pub fn with_business_name(mut self, business_name: impl Into<String>) -> Self {
        self.business_name = business_name.into();
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    fn validate_name(name: &str) -> Result<(), TenantError> {
        if name.trim().is_empty() {
            return Err(TenantError::EmptyName);
        }
        let valid = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(TenantError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    fn validate_domain(domain: &str) -> Result<(), TenantError> {
        if domain.trim().is_empty() {
            return Err(TenantError::EmptyDomain);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_generates_uuid_v7() {
        let id = TenantId::new();
        assert_eq!(id.as_uuid().get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn tenant_id_parses_valid_uuid_string() {
        let original = TenantId::new();
        let parsed = TenantId::parse(&original.to_string()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn tenant_id_rejects_invalid_string() {
        assert!(matches!(
            TenantId::parse("not-a-uuid"),
            Err(TenantError::NotFound(_))
        ));
    }

    #[test]
    fn tenant_creates_with_valid_name_and_domain() {
        let tenant = Tenant::new("acme-corp".to_string(), "acme.example.com".to_string()).unwrap();
        assert_eq!(tenant.name, "acme-corp");
        assert_eq!(tenant.domain, "acme.example.com");
        assert!(tenant.is_active);
    }

    #[test]
    fn tenant_rejects_empty_name() {
        let result = Tenant::new("".to_string(), "acme.example.com".to_string());
        assert_eq!(result, Err(TenantError::EmptyName));
    }

    #[test]
    fn tenant_rejects_uppercase_name() {
        let result = Tenant::new("Acme Corp".to_string(), "acme.example.com".to_string());
        assert!(matches!(result, Err(TenantError::InvalidName(_))));
    }

    #[test]
    fn tenant_rejects_empty_domain() {
        let result = Tenant::new("acme".to_string(), "  ".to_string());
        assert_eq!(result, Err(TenantError::EmptyDomain));
    }

    #[test]
    fn inactive_builder_flag_clears_active() {
        let tenant = Tenant::new("acme".to_string(), "acme.example.com".to_string())
            .unwrap()
            .active(false);
        assert!(!tenant.is_active);
    }

    #[test]
    fn resolution_methods_have_distinct_cache_namespaces() {
        let namespaces = [
            ResolutionMethod::Token.cache_namespace(),
            ResolutionMethod::Header.cache_namespace(),
            ResolutionMethod::Domain.cache_namespace(),
        ];
        assert_eq!(namespaces[0], "tenant:jwt");
        assert_ne!(namespaces[0], namespaces[1]);
        assert_ne!(namespaces[1], namespaces[2]);
    }
}
