//! Payment gateway boundary.
//!
//! Checkout talks to the processor through the [`PaymentGateway`]
//! trait; [`stripe::StripeGateway`] is the production implementation
//! and tests substitute their own. Incoming processor events are
//! handled by [`webhook`].

pub mod stripe;
pub mod webhook;

use async_trait::async_trait;

/// One displayable line of a hosted checkout session. Amounts are in
/// minor units (cents) because that is what processors accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount_minor: i64,
    pub quantity: u32,
    pub image_url: Option<String>,
}

/// Request to open a hosted checkout session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub line_items: Vec<SessionLineItem>,
    pub customer_email: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Round-trips through the processor so the webhook can find the
    /// booking this session pays for.
    pub booking_id: String,
    pub tenant_id: String,
}

/// A session the processor agreed to host.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment gateway rejected the session: status {status}")]
    Rejected {
        status: u16,
        /// Processor error body, logged server-side only.
        body: String,
    },
    #[error("payment gateway response missing the session url")]
    MissingUrl,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<CheckoutSession, PaymentError>;
}
