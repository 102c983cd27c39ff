//! Checkout orchestration.
//!
//! Validates the submitted cart, creates the `UNPAID` booking
//! atomically, opens the hosted payment session, and unwinds the
//! booking if the processor refuses. The booking is committed before
//! the processor call so no database locks are held across network
//! I/O; the compensating discard keeps a refused checkout from
//! leaving a half-created order behind.

use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazaar_core::order::{validate_quantity, Booking, CustomerInfo};
use bazaar_core::catalog::ProductId;
use bazaar_core::tenant::Tenant;

use crate::config::GatewayConfig;
use crate::db::{BookingStore, CartLine};
use crate::error::ApiError;
use crate::metrics;
use crate::payments::{PaymentGateway, SessionLineItem, SessionRequest};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub customer_email: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub gift_message: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub variant: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub booking_id: String,
    pub session_id: String,
}

pub struct CheckoutService {
    store: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<GatewayConfig>,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub async fn create_checkout(
        &self,
        tenant: &Tenant,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ApiError> {
        let timer = metrics::CHECKOUT_LATENCY.start_timer();
        let result = self.create_checkout_inner(tenant, request).await;
        timer.observe_duration();
        result
    }

    async fn create_checkout_inner(
        &self,
        tenant: &Tenant,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ApiError> {
        let (customer, lines) = validate(request).inspect_err(|_| {
            metrics::CHECKOUTS_FAILED
                .with_label_values(&["validation"])
                .inc();
        })?;

        let booking = self
            .store
            .create_unpaid(tenant.id, customer, &lines)
            .await
            .inspect_err(|_| {
                metrics::CHECKOUTS_FAILED.with_label_values(&["stock"]).inc();
            })?;

        let session_request = self.session_request(tenant, &booking);
        let session = match self.gateway.create_session(&session_request).await {
            Ok(session) => session,
            Err(err) => {
                metrics::CHECKOUTS_FAILED
                    .with_label_values(&["gateway"])
                    .inc();
                tracing::error!(
                    booking_id = %booking.id,
                    tenant_id = %tenant.id,
                    error = %err,
                    "payment session failed, discarding booking"
                );
                if let Err(discard_err) = self.store.discard(booking.id).await {
                    tracing::error!(
                        booking_id = %booking.id,
                        error = %discard_err,
                        "failed to discard booking after gateway error"
                    );
                }
                return Err(err.into());
            }
        };

        self.store.attach_session(booking.id, &session.id).await?;
        metrics::CHECKOUTS_CREATED.inc();
        tracing::info!(
            booking_id = %booking.id,
            tenant_id = %tenant.id,
            session_id = %session.id,
            total = %booking.total,
            "checkout session created"
        );

        Ok(CheckoutResponse {
            checkout_url: session.url,
            booking_id: booking.id.to_string(),
            session_id: session.id,
        })
    }

    fn session_request(&self, tenant: &Tenant, booking: &Booking) -> SessionRequest {
        let mut line_items: Vec<SessionLineItem> = booking
            .items
            .iter()
            .map(|item| SessionLineItem {
                name: if item.variant_name.is_empty() {
                    item.product_name.clone()
                } else {
                    format!("{} ({})", item.product_name, item.variant_name)
                },
                unit_amount_minor: minor_units(item.unit_price),
                quantity: item.quantity,
                image_url: (!item.product_image.is_empty()).then(|| item.product_image.clone()),
            })
            .collect();

        if booking.shipping_cost > Decimal::ZERO {
            line_items.push(SessionLineItem {
                name: "Shipping".to_string(),
                unit_amount_minor: minor_units(booking.shipping_cost),
                quantity: 1,
                image_url: None,
            });
        }

        SessionRequest {
            line_items,
            customer_email: booking.customer.email.clone(),
            currency: self.config.currency.clone(),
            success_url: self.config.stripe_success_url.clone(),
            cancel_url: self.config.stripe_cancel_url.clone(),
            booking_id: booking.id.to_string(),
            tenant_id: tenant.id.to_string(),
        }
    }
}

fn validate(request: CheckoutRequest) -> Result<(CustomerInfo, Vec<CartLine>), ApiError> {
    if request.items.is_empty() {
        return Err(ApiError::BadRequest("cart is empty".into()));
    }

    let email = request.customer_email.trim();
    if email.is_empty() || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(ApiError::BadRequest(format!(
            "invalid customer email: {email:?}"
        )));
    }

    let mut lines = Vec::with_capacity(request.items.len());
    for item in &request.items {
        validate_quantity(item.quantity)?;
        lines.push(CartLine {
            product_id: ProductId::from_uuid(item.product_id),
            quantity: item.quantity,
            variant: item.variant.clone(),
        });
    }

    let customer = CustomerInfo {
        email: email.to_string(),
        name: request.customer_name.trim().to_string(),
        is_gift: request.is_gift,
        gift_message: request.gift_message,
    };
    Ok((customer, lines))
}

/// Convert a NUMERIC(10,2) amount to minor units. Values in that range
/// always fit an i64.
fn minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or_default()
}
