//! Shared harness for gateway integration tests: an in-memory store
//! behind the real router, with a scripted payment gateway.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

use bazaar_core::catalog::Product;
use bazaar_core::tenant::Tenant;

use bazaar_gateway::auth::JwtConfig;
use bazaar_gateway::checkout::CheckoutService;
use bazaar_gateway::db::memory::MemoryStore;
use bazaar_gateway::db::{CatalogStore, TenantDirectory};
use bazaar_gateway::middleware::ratelimit::RateLimiter;
use bazaar_gateway::middleware::IsolationState;
use bazaar_gateway::notify::LogNotifier;
use bazaar_gateway::payments::webhook::Reconciler;
use bazaar_gateway::payments::{CheckoutSession, PaymentError, PaymentGateway, SessionRequest};
use bazaar_gateway::tenant::cache::TenantCache;
use bazaar_gateway::tenant::TenantResolver;
use bazaar_gateway::{build_router, AppState, GatewayConfig};

/// Payment gateway that accepts every session, or refuses every one.
pub struct ScriptedGateway {
    refuse: bool,
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_session(
        &self,
        request: &SessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if self.refuse {
            return Err(PaymentError::Rejected {
                status: 503,
                body: "processor unavailable".into(),
            });
        }
        Ok(CheckoutSession {
            id: format!("cs_test_{}", request.booking_id),
            url: format!("https://pay.example/cs_test_{}", request.booking_id),
        })
    }
}

pub struct Harness {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub config: Arc<GatewayConfig>,
    pub jwt: JwtConfig,
}

pub fn harness() -> Harness {
    harness_with(GatewayConfig::default(), false)
}

pub fn refusing_harness() -> Harness {
    harness_with(GatewayConfig::default(), true)
}

pub fn harness_with(config: GatewayConfig, refuse_payments: bool) -> Harness {
    let config = Arc::new(config);
    let store = Arc::new(MemoryStore::new());
    let jwt = JwtConfig::new(&config.jwt_secret);

    let cache = Arc::new(TenantCache::new(
        config.tenant_cache_ttl,
        config.tenant_negative_cache_ttl,
    ));
    let resolver = TenantResolver::new(
        Arc::clone(&store) as _,
        cache,
        JwtConfig::new(&config.jwt_secret),
    );
    let isolation = Arc::new(IsolationState {
        resolver,
        limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
        production: config.production,
    });

    let gateway = Arc::new(ScriptedGateway {
        refuse: refuse_payments,
    });
    let checkout = Arc::new(CheckoutService::new(
        Arc::clone(&store) as _,
        gateway,
        Arc::clone(&config),
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store) as _,
        Arc::new(LogNotifier),
    ));

    let state = AppState {
        checkout,
        bookings: Arc::clone(&store) as _,
        reconciler,
        config: Arc::clone(&config),
    };
    let app = build_router(state, isolation);

    Harness {
        app,
        store,
        config,
        jwt,
    }
}

impl Harness {
    pub async fn seed_tenant(&self, name: &str, domain: &str) -> Tenant {
        let tenant = Tenant::new(name.to_string(), domain.to_string()).unwrap();
        self.store.insert(&tenant).await.unwrap();
        tenant
    }

    pub async fn seed_product(&self, tenant: &Tenant, price: Decimal, stock: u32) -> Product {
        let mut product = Product::new(tenant.id, "Widget", price);
        product.stock = stock;
        self.store.add_product(&product).await.unwrap();
        product
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn json_request(method: &str, uri: &str, tenant: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-tenant", tenant)
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str, tenant: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-tenant", tenant)
        .body(Body::empty())
        .unwrap()
}

pub fn checkout_body(product: &Product, quantity: u32) -> Value {
    serde_json::json!({
        "items": [{ "product_id": product.id.as_uuid(), "quantity": quantity }],
        "customer_email": "buyer@example.com",
        "customer_name": "Buyer"
    })
}
