//! Persistence layer: tenant directory, catalog reads, and the booking
//! ledger.
//!
//! Every operation that touches tenant-scoped data takes the tenant
//! explicitly; nothing in this layer infers a tenant from ambient state.
//! The SQLx/PostgreSQL backend lives in [`postgres`], and an in-memory
//! backend with identical semantics (used by the test suite and
//! databaseless local development) lives in [`memory`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bazaar_core::catalog::{Product, ProductId};
use bazaar_core::order::{Booking, BookingId, CustomerInfo};
use bazaar_core::tenant::{Tenant, TenantId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// SQL schema for the `tenants` table.
pub const TENANTS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL UNIQUE,
    business_name TEXT NOT NULL DEFAULT '',
    email TEXT NOT NULL DEFAULT '',
    phone TEXT NOT NULL DEFAULT '',
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);"#;

/// SQL schema for the `products` table.
pub const PRODUCTS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    sku TEXT NOT NULL DEFAULT '',
    short_description TEXT NOT NULL DEFAULT '',
    image_url TEXT NOT NULL DEFAULT '',
    price NUMERIC(10,2) NOT NULL,
    discount_kind TEXT NOT NULL DEFAULT 'none',
    discount_value NUMERIC(10,2) NOT NULL DEFAULT 0,
    discount_start TIMESTAMPTZ,
    discount_end TIMESTAMPTZ,
    stock INTEGER NOT NULL DEFAULT 0,
    track_inventory BOOLEAN NOT NULL DEFAULT TRUE,
    allow_backorders BOOLEAN NOT NULL DEFAULT FALSE,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    total_sales INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_products_tenant ON products (tenant_id, is_active);"#;

/// SQL schema for the `bookings` table.
pub const BOOKINGS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS bookings (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    customer_email TEXT NOT NULL,
    customer_name TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'UNPAID',
    subtotal NUMERIC(10,2) NOT NULL,
    shipping_cost NUMERIC(10,2) NOT NULL DEFAULT 0,
    total NUMERIC(10,2) NOT NULL,
    is_gift BOOLEAN NOT NULL DEFAULT FALSE,
    gift_message TEXT NOT NULL DEFAULT '',
    checkout_session_id TEXT,
    payment_intent_id TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    paid_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_bookings_tenant_status ON bookings (tenant_id, status);
CREATE INDEX IF NOT EXISTS idx_bookings_tenant_email ON bookings (tenant_id, customer_email);
CREATE INDEX IF NOT EXISTS idx_bookings_intent ON bookings (payment_intent_id);"#;

/// SQL schema for the `booking_items` table.
pub const BOOKING_ITEMS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS booking_items (
    id BIGSERIAL PRIMARY KEY,
    booking_id UUID NOT NULL REFERENCES bookings(id) ON DELETE CASCADE,
    tenant_id UUID NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
    product_id UUID REFERENCES products(id) ON DELETE SET NULL,
    product_name TEXT NOT NULL,
    product_sku TEXT NOT NULL DEFAULT '',
    variant_name TEXT NOT NULL DEFAULT '',
    product_image TEXT NOT NULL DEFAULT '',
    unit_price NUMERIC(10,2) NOT NULL,
    quantity INTEGER NOT NULL,
    line_total NUMERIC(10,2) NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_booking_items_booking ON booking_items (tenant_id, booking_id);
CREATE INDEX IF NOT EXISTS idx_booking_items_product ON booking_items (product_id);"#;

/// Error type returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database query failed; the dependency is treated as unavailable.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Product missing, inactive, or owned by another tenant.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),
    /// Available stock cannot cover the requested quantity.
    #[error("insufficient stock for {0}")]
    InsufficientStock(String),
    /// Unique constraint violated (tenant name/domain already taken).
    #[error("duplicate value for {0}")]
    Duplicate(&'static str),
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),
}

/// One line of a submitted cart. Quantities are validated by the
/// orchestrator before this reaches a store.
#[derive(Debug, Clone)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub variant: String,
}

/// Persistent source of truth for tenant records.
///
/// Lookups return the record regardless of its active flag; the resolver
/// decides whether an inactive match is an error.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Administrative provisioning.
    async fn insert(&self, tenant: &Tenant) -> Result<(), StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError>;
    /// Token identifiers may be either a tenant name or a domain.
    async fn find_by_name_or_domain(&self, identifier: &str) -> Result<Option<Tenant>, StoreError>;
    /// Exact domain match, or the leading subdomain label (excluding
    /// `www`) matched against the tenant name. `host` has no port.
    async fn find_by_host(&self, host: &str) -> Result<Option<Tenant>, StoreError>;
    async fn set_active(&self, id: TenantId, active: bool) -> Result<(), StoreError>;
}

/// Catalog reads consumed by checkout, always scoped to one tenant.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn add_product(&self, product: &Product) -> Result<(), StoreError>;
    async fn get_product(
        &self,
        tenant_id: TenantId,
        id: ProductId,
    ) -> Result<Option<Product>, StoreError>;
}

/// The booking ledger: creation, immutable snapshotting, and idempotent
/// status transitions.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Atomically validate the cart against current catalog state and
    /// persist one `UNPAID` booking plus its line-item snapshots.
    ///
    /// Stock precondition: for tracked-inventory products,
    /// `stock - quantities reserved by non-terminal bookings >= quantity`,
    /// evaluated under locking so two concurrent checkouts can never both
    /// pass with insufficient stock. Any failure leaves nothing persisted.
    async fn create_unpaid(
        &self,
        tenant_id: TenantId,
        customer: CustomerInfo,
        lines: &[CartLine],
    ) -> Result<Booking, StoreError>;

    async fn attach_session(&self, id: BookingId, session_id: &str) -> Result<(), StoreError>;

    /// Compensating removal used when the payment-gateway call fails, so
    /// no half-created order survives a failed checkout.
    async fn discard(&self, id: BookingId) -> Result<(), StoreError>;

    async fn find_for_tenant(
        &self,
        tenant_id: TenantId,
        id: BookingId,
    ) -> Result<Option<Booking>, StoreError>;

    async fn list_for_tenant(
        &self,
        tenant_id: TenantId,
        email: Option<&str>,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Unscoped fetch for the reconciler, which authenticates via the
    /// gateway signature and derives the tenant from the record itself.
    async fn find_unscoped(&self, id: BookingId) -> Result<Option<Booking>, StoreError>;

    /// Idempotent `PAID` transition. Returns the booking (with items)
    /// only when this call performed the flip; `None` when the booking is
    /// unknown, already `PAID`, or otherwise terminal. On the first
    /// application, stock is decremented and sales counters incremented
    /// for every item whose product still exists and tracks inventory,
    /// in the same transaction as the status change.
    async fn mark_paid(
        &self,
        id: BookingId,
        payment_intent: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, StoreError>;

    /// `FAILED` transition keyed by the stored payment-intent id. No-op
    /// (returns `None`) when no booking matches or it is already
    /// terminal.
    async fn mark_failed_by_intent(
        &self,
        payment_intent: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BookingId>, StoreError>;
}

/// Match a host against a tenant name the way the directory does: the
/// leading subdomain label, unless it is `www` or the host has no
/// subdomain.
pub(crate) fn subdomain_label(host: &str) -> Option<&str> {
    let mut parts = host.split('.');
    let first = parts.next()?;
    // Need at least one more label for `first` to be a subdomain.
    parts.next()?;
    if first == "www" || first.is_empty() {
        None
    } else {
        Some(first)
    }
}
