//! Bazaar gateway entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bazaar_gateway::auth::JwtConfig;
use bazaar_gateway::checkout::CheckoutService;
use bazaar_gateway::db::memory::MemoryStore;
use bazaar_gateway::db::postgres::{
    init_pool, initialize_schema, SqlxBookingStore, SqlxTenantDirectory,
};
use bazaar_gateway::db::{BookingStore, TenantDirectory};
use bazaar_gateway::middleware::ratelimit::RateLimiter;
use bazaar_gateway::middleware::IsolationState;
use bazaar_gateway::notify::LogNotifier;
use bazaar_gateway::payments::stripe::StripeGateway;
use bazaar_gateway::payments::webhook::Reconciler;
use bazaar_gateway::tenant::cache::TenantCache;
use bazaar_gateway::tenant::TenantResolver;
use bazaar_gateway::{build_router, AppState, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "bazaar_gateway=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Bazaar Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(GatewayConfig::from_env()?);

    let (directory, bookings): (Arc<dyn TenantDirectory>, Arc<dyn BookingStore>) =
        match &config.database_url {
            Some(url) => {
                let pool = init_pool(url).await?;
                initialize_schema(&pool).await?;
                tracing::info!("connected to PostgreSQL");
                (
                    Arc::new(SqlxTenantDirectory::new(pool.clone())),
                    Arc::new(SqlxBookingStore::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store");
                let store = Arc::new(MemoryStore::new());
                (Arc::clone(&store) as _, store as _)
            }
        };

    let cache = Arc::new(TenantCache::new(
        config.tenant_cache_ttl,
        config.tenant_negative_cache_ttl,
    ));
    let resolver = TenantResolver::new(directory, cache, JwtConfig::new(&config.jwt_secret));
    let isolation = Arc::new(IsolationState {
        resolver,
        limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
        production: config.production,
    });

    let gateway = Arc::new(StripeGateway::new(config.stripe_secret_key.clone()));
    let checkout = Arc::new(CheckoutService::new(
        Arc::clone(&bookings),
        gateway,
        Arc::clone(&config),
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&bookings),
        Arc::new(LogNotifier),
    ));

    let state = AppState {
        checkout,
        bookings,
        reconciler,
        config: Arc::clone(&config),
    };
    let app = build_router(state, isolation);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Listening on {}", config.bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
