//! Booking ledger - the order aggregate and its status state machine.
//!
//! A booking is created once per checkout attempt with amounts computed
//! server-side, then only ever mutated through the defined status
//! transitions. Line items are immutable snapshots of the catalog at the
//! moment of purchase.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::catalog::ProductId;
use crate::tenant::TenantId;

/// Flat shipping fee charged below the free-shipping threshold.
pub const FLAT_SHIPPING_FEE: Decimal = Decimal::from_parts(2500, 0, 0, false, 2);

/// Subtotal at or above which shipping is waived.
pub const FREE_SHIPPING_THRESHOLD: Decimal = Decimal::from_parts(25000, 0, 0, false, 2);

/// Fixed threshold shipping rule: flat fee, waived at the threshold.
pub fn shipping_cost(subtotal: Decimal) -> Decimal {
    if subtotal >= FREE_SHIPPING_THRESHOLD {
        Decimal::ZERO
    } else {
        FLAT_SHIPPING_FEE
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("quantity must be between 1 and 100, got {0}")]
    InvalidQuantity(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(Uuid);

impl BookingId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Unpaid,
    Pending,
    Paid,
    Failed,
    Refunded,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Unpaid => "UNPAID",
            BookingStatus::Pending => "PENDING",
            BookingStatus::Paid => "PAID",
            BookingStatus::Failed => "FAILED",
            BookingStatus::Refunded => "REFUNDED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(BookingStatus::Unpaid),
            "PENDING" => Some(BookingStatus::Pending),
            "PAID" => Some(BookingStatus::Paid),
            "FAILED" => Some(BookingStatus::Failed),
            "REFUNDED" => Some(BookingStatus::Refunded),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal with respect to payment processing; the reconciler never
    /// moves a booking out of these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Paid
                | BookingStatus::Failed
                | BookingStatus::Refunded
                | BookingStatus::Cancelled
        )
    }

    pub fn can_transition(&self, to: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, to) {
            (Unpaid, Pending) | (Unpaid, Paid) | (Pending, Paid) => true,
            (Unpaid, Failed) | (Pending, Failed) => true,
            (Paid, Refunded) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_gift: bool,
    #[serde(default)]
    pub gift_message: String,
}

/// Immutable snapshot of one cart line at the moment of purchase.
///
/// The product reference is weak: the catalog row may be removed later
/// without touching the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingItem {
    pub booking_id: BookingId,
    pub tenant_id: TenantId,
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub product_sku: String,
    pub variant_name: String,
    pub product_image: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub line_total: Decimal,
}

impl BookingItem {
    /// `line_total` is always recomputed here; callers never supply it.
    #[allow(clippy::too_many_arguments)]
    pub fn snapshot(
        booking_id: BookingId,
        tenant_id: TenantId,
        product_id: ProductId,
        product_name: impl Into<String>,
        product_sku: impl Into<String>,
        variant_name: impl Into<String>,
        product_image: impl Into<String>,
        unit_price: Decimal,
        quantity: u32,
    ) -> Self {
        Self {
            booking_id,
            tenant_id,
            product_id: Some(product_id),
            product_name: product_name.into(),
            product_sku: product_sku.into(),
            variant_name: variant_name.into(),
            product_image: product_image.into(),
            unit_price,
            quantity,
            line_total: unit_price * Decimal::from(quantity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    /// Owning tenant, set at creation and never reassigned.
    pub tenant_id: TenantId,
    pub customer: CustomerInfo,
    pub status: BookingStatus,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub checkout_session_id: Option<String>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<BookingItem>,
}

impl Booking {
    /// Create an unpaid booking with server-computed amounts.
    /// `total == subtotal + shipping_cost` holds by construction.
    pub fn create_unpaid(tenant_id: TenantId, customer: CustomerInfo, subtotal: Decimal) -> Self {
        let shipping = shipping_cost(subtotal);
        let now = Utc::now();
        Self {
            id: BookingId::new(),
            tenant_id,
            customer,
            status: BookingStatus::Unpaid,
            subtotal,
            shipping_cost: shipping,
            total: subtotal + shipping,
            checkout_session_id: None,
            payment_intent_id: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            items: Vec::new(),
        }
    }

    /// Apply a checked status transition.
    pub fn transition(&mut self, to: BookingStatus, at: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = at;
        if to == BookingStatus::Paid {
            self.paid_at = Some(at);
        }
        Ok(())
    }

    /// Mark as paid, recording the reconciliation time. The only
    /// transition that sets `paid_at`.
    pub fn mark_paid(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(BookingStatus::Paid, at)
    }

    /// Mark as failed. Repeated failure events are no-ops for callers
    /// that check `is_terminal` first; at this level a second `FAILED`
    /// is rejected like any other invalid transition.
    pub fn mark_failed(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.transition(BookingStatus::Failed, at)
    }
}

/// Quantity bounds accepted on a checkout line.
pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 100;

pub fn validate_quantity(quantity: u32) -> Result<(), OrderError> {
    if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
        return Err(OrderError::InvalidQuantity(quantity));
    }
    Ok(())
}
