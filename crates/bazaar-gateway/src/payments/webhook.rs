//! Processor webhook verification and payment reconciliation.
//!
//! The webhook endpoint is the only write path that bypasses tenant
//! resolution: the HMAC signature authenticates the caller, and the
//! tenant is recovered from the booking the event references.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use bazaar_core::order::BookingId;

use crate::db::{BookingStore, StoreError};
use crate::metrics;
use crate::notify::{dispatch_confirmation, Notifier, OrderSummary};

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed timestamp.
pub const SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Verify a `Stripe-Signature` header of the form
/// `t=<unix-ts>,v1=<hex hmac-sha256 of "<ts>.<payload>">`.
/// Any one matching `v1` entry is sufficient.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }

    let ts: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    let age = now.timestamp() - ts;
    if age.unsigned_abs() > tolerance.as_secs() {
        return Err(SignatureError::StaleTimestamp);
    }

    for candidate in candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        // HMAC keys of any length are accepted.
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            continue;
        };
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice is constant-time.
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// Sign a payload the way the processor does. Test helper, also handy
/// for local webhook simulation.
pub fn sign_payload(payload: &[u8], secret: &str, at: DateTime<Utc>) -> String {
    let ts = at.timestamp().to_string();
    // HMAC-SHA256 accepts keys of any length, so this cannot fail.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("t={ts},v1={digest}")
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Applies verified processor events to the booking ledger.
pub struct Reconciler {
    store: Arc<dyn BookingStore>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn BookingStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Apply one verified event. Events that reference nothing we know
    /// are logged and dropped; only storage failures propagate, so the
    /// processor retries exactly the deliveries that might still land.
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<(), StoreError> {
        metrics::WEBHOOK_EVENTS
            .with_label_values(&[event.event_type.as_str()])
            .inc();

        match event.event_type.as_str() {
            "checkout.session.completed" => self.session_completed(&event.data.object).await,
            "payment_intent.payment_failed" => self.payment_failed(&event.data.object).await,
            other => {
                tracing::debug!(event_type = other, "webhook event ignored");
                Ok(())
            }
        }
    }

    async fn session_completed(&self, object: &serde_json::Value) -> Result<(), StoreError> {
        let Some(booking_id) = object
            .pointer("/metadata/booking_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(BookingId::from_uuid)
        else {
            tracing::warn!("completed session carries no usable booking_id, discarding");
            return Ok(());
        };

        let payment_intent = object
            .get("payment_intent")
            .and_then(|v| v.as_str())
            .or_else(|| object.get("id").and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();

        match self.store.mark_paid(booking_id, &payment_intent, Utc::now()).await? {
            Some(booking) => {
                metrics::BOOKINGS_PAID.inc();
                tracing::info!(
                    booking_id = %booking_id,
                    tenant_id = %booking.tenant_id,
                    "booking paid"
                );
                dispatch_confirmation(
                    Arc::clone(&self.notifier),
                    OrderSummary::from_booking(&booking),
                );
            }
            None => {
                // Replay or unknown booking. Both acknowledge cleanly.
                tracing::info!(booking_id = %booking_id, "completed session had no effect");
            }
        }
        Ok(())
    }

    async fn payment_failed(&self, object: &serde_json::Value) -> Result<(), StoreError> {
        let Some(intent) = object.get("id").and_then(|v| v.as_str()) else {
            tracing::warn!("failed payment event carries no intent id, discarding");
            return Ok(());
        };
        match self.store.mark_failed_by_intent(intent, Utc::now()).await? {
            Some(booking_id) => {
                tracing::info!(booking_id = %booking_id, intent, "booking marked failed");
            }
            None => {
                tracing::debug!(intent, "failed payment matched no open booking");
            }
        }
        Ok(())
    }
}
