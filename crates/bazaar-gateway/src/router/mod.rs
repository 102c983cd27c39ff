//! HTTP routing for the Bazaar gateway.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use bazaar_core::order::BookingId;

use crate::checkout::{CheckoutRequest, CheckoutService};
use crate::config::GatewayConfig;
use crate::context::CurrentTenant;
use crate::db::BookingStore;
use crate::error::ApiError;
use crate::metrics;
use crate::middleware::{isolation_gate, IsolationState};
use crate::payments::webhook::{verify_signature, Reconciler, WebhookEvent, SIGNATURE_TOLERANCE};

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutService>,
    pub bookings: Arc<dyn BookingStore>,
    pub reconciler: Arc<Reconciler>,
    pub config: Arc<GatewayConfig>,
}

/// Build the full application router, with every tenant-scoped route
/// behind the isolation gate.
pub fn build_router(state: AppState, isolation: Arc<IsolationState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/payments/bookings", get(list_bookings))
        .route("/api/payments/bookings/:id", get(get_booking))
        .route(
            "/api/payments/bookings/create_checkout",
            post(create_checkout),
        )
        .route("/api/payments/webhook", post(webhook))
        .layer(axum_middleware::from_fn_with_state(isolation, isolation_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_endpoint() -> String {
    metrics::gather()
}

#[derive(Debug, Deserialize)]
struct BookingsQuery {
    email: Option<String>,
}

async fn list_bookings(
    State(state): State<AppState>,
    CurrentTenant(ctx): CurrentTenant,
    Query(query): Query<BookingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let bookings = state
        .bookings
        .list_for_tenant(ctx.tenant_id(), query.email.as_deref())
        .await?;
    Ok(Json(bookings))
}

async fn get_booking(
    State(state): State<AppState>,
    CurrentTenant(ctx): CurrentTenant,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booking = state
        .bookings
        .find_for_tenant(ctx.tenant_id(), BookingId::from_uuid(id))
        .await?
        .ok_or(ApiError::NotFound("booking"))?;
    Ok(Json(booking))
}

async fn create_checkout(
    State(state): State<AppState>,
    CurrentTenant(ctx): CurrentTenant,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let response = state.checkout.create_checkout(&ctx.tenant, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Webhook entry point. Signature failures and unparseable payloads
/// are `400` and never touch the ledger; acknowledged events return
/// `200` so the processor stops redelivering.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Err(err) = verify_signature(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        SIGNATURE_TOLERANCE,
        Utc::now(),
    ) {
        metrics::WEBHOOK_SIGNATURE_FAILURES.inc();
        tracing::warn!(error = %err, "webhook signature rejected");
        return Err(ApiError::BadRequest("invalid webhook signature".into()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("malformed webhook payload".into()))?;

    state.reconciler.handle_event(event).await?;
    Ok(Json(json!({ "status": "success" })))
}
