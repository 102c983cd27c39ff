//! Bearer-token tenant identity.
//!
//! Tokens are HS256 JWTs carrying a `tenant` claim. Mandatory claims are
//! `exp` and `iat`. An expired, malformed, or signature-invalid token is
//! treated as absent - resolution falls through to the next method - and
//! is never surfaced to the client as an authentication error. That
//! fall-through is deliberate policy, not an oversight.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims used for tenant identification.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (customer or service identity). Not used for isolation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration time (seconds since epoch).
    pub exp: usize,
    /// Issued at (seconds since epoch).
    pub iat: usize,
    /// Tenant identifier: a tenant name or domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
}

#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub expiry_seconds: u64,
}

impl JwtConfig {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_seconds: 3600,
        }
    }

    /// Generate a token carrying a tenant claim.
    pub fn generate_token(&self, tenant: &str) -> Result<String, AuthError> {
        self.generate_token_at(tenant, chrono::Utc::now().timestamp() as usize)
    }

    pub fn generate_token_at(&self, tenant: &str, iat: usize) -> Result<String, AuthError> {
        let claims = Claims {
            sub: None,
            exp: iat + self.expiry_seconds as usize,
            iat,
            tenant: Some(tenant.to_string()),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| AuthError::InvalidToken)
    }

    /// Verify a token's signature and mandatory claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "iat"]);
        validation.validate_aud = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            })
    }

    /// Extract the tenant-identifier claim from an `Authorization` header
    /// value. Any decoding failure is logged and reported as absence.
    pub fn tenant_claim(&self, authorization: &str) -> Option<String> {
        let token = authorization.strip_prefix("Bearer ")?;
        match self.verify_token(token) {
            Ok(claims) => claims.tenant,
            Err(AuthError::TokenExpired) => {
                tracing::debug!("expired bearer token ignored for tenant resolution");
                None
            }
            Err(AuthError::InvalidToken) => {
                tracing::debug!("invalid bearer token ignored for tenant resolution");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_tenant_claim() {
        let config = JwtConfig::new("test_secret_key_that_is_long_enough");
        let token = config.generate_token("acme").unwrap();
        let claims = config.verify_token(&token).unwrap();
        assert_eq!(claims.tenant.as_deref(), Some("acme"));
    }

    #[test]
    fn garbage_token_is_rejected() {
        let config = JwtConfig::new("test_secret_key");
        assert!(matches!(
            config.verify_token("not-a-jwt"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let config = JwtConfig::new("test_secret_key");
        let long_ago = (chrono::Utc::now().timestamp() - 100_000) as usize;
        let token = config.generate_token_at("acme", long_ago).unwrap();
        assert!(matches!(
            config.verify_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn tenant_claim_treats_bad_tokens_as_absent() {
        let config = JwtConfig::new("test_secret_key");
        assert_eq!(config.tenant_claim("Bearer garbage"), None);
        assert_eq!(config.tenant_claim("Basic dXNlcjpwYXNz"), None);

        let other = JwtConfig::new("a_different_secret_entirely");
        let token = other.generate_token("acme").unwrap();
        // Signed with the wrong key: absent, not an error.
        assert_eq!(config.tenant_claim(&format!("Bearer {token}")), None);
    }

    #[test]
    fn tenant_claim_extracts_from_valid_token() {
        let config = JwtConfig::new("test_secret_key");
        let token = config.generate_token("acme.example.com").unwrap();
        assert_eq!(
            config.tenant_claim(&format!("Bearer {token}")),
            Some("acme.example.com".to_string())
        );
    }
}
