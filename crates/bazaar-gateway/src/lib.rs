//! Bazaar gateway.
//!
//! Multi-tenant storefront edge: resolves the tenant behind every
//! request, enforces isolation before any handler runs, and drives
//! checkout and payment reconciliation against the booking ledger.

pub mod auth;
pub mod checkout;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod notify;
pub mod payments;
pub mod router;
pub mod tenant;

pub use config::GatewayConfig;
pub use router::{build_router, AppState};

/// Gateway version
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
