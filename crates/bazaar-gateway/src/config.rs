//! Gateway configuration, read from the environment at startup.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Header carrying an explicit tenant selector.
pub const TENANT_HEADER: &str = "x-tenant";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    /// Secret used to verify tenant bearer tokens.
    pub jwt_secret: String,
    /// Positive cache entries live this long.
    pub tenant_cache_ttl: Duration,
    /// Negative ("confirmed not found") entries live this long.
    pub tenant_negative_cache_ttl: Duration,
    /// Tenant-identification attempts allowed per client IP per window.
    pub rate_limit_per_minute: u32,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_success_url: String,
    pub stripe_cancel_url: String,
    /// ISO currency code sent to the payment gateway.
    pub currency: String,
    /// Production deployments get strict transport/CSP headers and no
    /// resolution diagnostics in error bodies.
    pub production: bool,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env::var("BAZAAR_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".into())
            .parse()?;

        Ok(Self {
            bind_addr,
            database_url: env::var("DATABASE_URL").ok(),
            jwt_secret: env::var("BAZAAR_JWT_SECRET")
                .unwrap_or_else(|_| "insecure-dev-secret".into()),
            tenant_cache_ttl: Duration::from_secs(env_u64("TENANT_CACHE_TTL_SECS", 300)),
            tenant_negative_cache_ttl: Duration::from_secs(env_u64(
                "TENANT_NEGATIVE_CACHE_TTL_SECS",
                60,
            )),
            rate_limit_per_minute: env_u64("TENANT_RATE_LIMIT_PER_MINUTE", 100) as u32,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            stripe_success_url: env::var("STRIPE_SUCCESS_URL")
                .unwrap_or_else(|_| "https://example.com/checkout/success".into()),
            stripe_cancel_url: env::var("STRIPE_CANCEL_URL")
                .unwrap_or_else(|_| "https://example.com/checkout/cancel".into()),
            currency: env::var("BAZAAR_CURRENCY").unwrap_or_else(|_| "usd".into()),
            production: env::var("BAZAAR_ENV")
                .map(|v| v.eq_ignore_ascii_case("production"))
                .unwrap_or(false),
        })
    }
}

impl Default for GatewayConfig {
    /// Non-production defaults, used by tests and local development.
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            database_url: None,
            jwt_secret: "insecure-dev-secret".into(),
            tenant_cache_ttl: Duration::from_secs(300),
            tenant_negative_cache_ttl: Duration::from_secs(60),
            rate_limit_per_minute: 100,
            stripe_secret_key: String::new(),
            stripe_webhook_secret: "whsec_test".into(),
            stripe_success_url: "https://example.com/checkout/success".into(),
            stripe_cancel_url: "https://example.com/checkout/cancel".into(),
            currency: "usd".into(),
            production: false,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
