//! Prometheus metrics for the Bazaar gateway.
//!
//! Exposed at `/metrics` in the Prometheus text format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Histogram,
};

lazy_static! {
    // ============================================================================
    // Tenant Resolution Metrics
    // ============================================================================

    /// Successful tenant resolutions by method (token, header, domain)
    pub static ref TENANT_RESOLUTIONS: CounterVec = register_counter_vec!(
        "bazaar_tenant_resolutions_total",
        "Successful tenant resolutions by method",
        &["method"]
    ).unwrap();

    /// Requests rejected by the isolation gate, by reason
    pub static ref TENANT_REJECTIONS: CounterVec = register_counter_vec!(
        "bazaar_tenant_rejections_total",
        "Requests rejected by the isolation gate",
        &["reason"]
    ).unwrap();

    /// Requests dropped by the per-client rate limiter
    pub static ref RATE_LIMIT_HITS: Counter = register_counter!(
        "bazaar_rate_limit_hits_total",
        "Requests dropped by the per-client rate limiter"
    ).unwrap();

    // ============================================================================
    // Checkout Metrics
    // ============================================================================

    /// Checkout sessions created
    pub static ref CHECKOUTS_CREATED: Counter = register_counter!(
        "bazaar_checkouts_created_total",
        "Checkout sessions created"
    ).unwrap();

    /// Checkout attempts that failed, by stage (validation, stock, gateway)
    pub static ref CHECKOUTS_FAILED: CounterVec = register_counter_vec!(
        "bazaar_checkouts_failed_total",
        "Failed checkout attempts by stage",
        &["stage"]
    ).unwrap();

    /// End-to-end checkout latency, including the payment gateway call
    pub static ref CHECKOUT_LATENCY: Histogram = register_histogram!(
        "bazaar_checkout_latency_seconds",
        "Checkout latency in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // ============================================================================
    // Payment Metrics
    // ============================================================================

    /// Webhook events received, by type
    pub static ref WEBHOOK_EVENTS: CounterVec = register_counter_vec!(
        "bazaar_webhook_events_total",
        "Webhook events received by type",
        &["type"]
    ).unwrap();

    /// Webhook deliveries rejected for a bad signature
    pub static ref WEBHOOK_SIGNATURE_FAILURES: Counter = register_counter!(
        "bazaar_webhook_signature_failures_total",
        "Webhook deliveries rejected for a bad signature"
    ).unwrap();

    /// Bookings marked paid
    pub static ref BOOKINGS_PAID: Counter = register_counter!(
        "bazaar_bookings_paid_total",
        "Bookings marked paid"
    ).unwrap();

    /// Order notifications, by outcome
    pub static ref NOTIFICATIONS: CounterVec = register_counter_vec!(
        "bazaar_notifications_total",
        "Order notifications by outcome",
        &["outcome"]
    ).unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::error!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
