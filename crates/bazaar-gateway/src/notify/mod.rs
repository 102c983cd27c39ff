//! Order confirmation notifications.
//!
//! Delivery is best-effort and fully decoupled from payment
//! reconciliation: a failed notification never rolls back a paid
//! booking and never fails a webhook acknowledgment.

pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use bazaar_core::order::{Booking, BookingId};

use crate::metrics;
use retry::{with_retry, RetryConfig};

/// What a notification channel needs to know about a paid order.
#[derive(Debug, Clone)]
pub struct OrderSummary {
    pub booking_id: BookingId,
    pub customer_email: String,
    pub customer_name: String,
    pub total: Decimal,
    pub item_count: usize,
}

impl OrderSummary {
    pub fn from_booking(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            customer_email: booking.customer.email.clone(),
            customer_name: booking.customer.name.clone(),
            total: booking.total,
            item_count: booking.items.len(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, summary: &OrderSummary) -> Result<(), NotifyError>;
}

/// Default channel: writes the confirmation to the log. Stands in for
/// an email or SMS integration.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, summary: &OrderSummary) -> Result<(), NotifyError> {
        tracing::info!(
            booking_id = %summary.booking_id,
            email = %summary.customer_email,
            total = %summary.total,
            items = summary.item_count,
            "order confirmation"
        );
        Ok(())
    }
}

/// Fire-and-forget dispatch with bounded retry. The spawned task owns
/// its failure; callers continue immediately.
pub fn dispatch_confirmation(notifier: Arc<dyn Notifier>, summary: OrderSummary) {
    tokio::spawn(async move {
        let config = RetryConfig::default();
        let outcome = with_retry(|| notifier.send_confirmation(&summary), &config).await;
        match outcome {
            Ok(()) => metrics::NOTIFICATIONS.with_label_values(&["sent"]).inc(),
            Err(err) => {
                metrics::NOTIFICATIONS.with_label_values(&["dropped"]).inc();
                tracing::warn!(
                    booking_id = %summary.booking_id,
                    error = %err,
                    "order confirmation dropped"
                );
            }
        }
    });
}
