//! In-memory store with the same semantics as the PostgreSQL backend.
//!
//! Backs the test suite and databaseless local development. A single
//! mutex stands in for the database transaction: every multi-entity
//! operation (checkout creation, the `PAID` flip) runs under it, so the
//! atomicity and stock-serialization guarantees match the SQL backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bazaar_core::catalog::{Product, ProductId};
use bazaar_core::order::{Booking, BookingId, BookingItem, BookingStatus, CustomerInfo};
use bazaar_core::tenant::{Tenant, TenantId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use super::{
    subdomain_label, BookingStore, CartLine, CatalogStore, StoreError, TenantDirectory,
};

#[derive(Debug, Default)]
struct Inner {
    tenants: HashMap<TenantId, Tenant>,
    products: HashMap<ProductId, Product>,
    bookings: HashMap<BookingId, Booking>,
}

impl Inner {
    /// Quantities held by non-terminal bookings against one product.
    fn reserved(&self, product_id: ProductId) -> u64 {
        self.bookings
            .values()
            .filter(|b| matches!(b.status, BookingStatus::Unpaid | BookingStatus::Pending))
            .flat_map(|b| b.items.iter())
            .filter(|item| item.product_id == Some(product_id))
            .map(|item| u64::from(item.quantity))
            .sum()
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stock of a product, unscoped. Test helper.
    pub async fn stock_of(&self, id: ProductId) -> Option<u32> {
        self.inner.lock().await.products.get(&id).map(|p| p.stock)
    }

    /// Current sales counter of a product, unscoped. Test helper.
    pub async fn sales_of(&self, id: ProductId) -> Option<u32> {
        self.inner
            .lock()
            .await
            .products
            .get(&id)
            .map(|p| p.total_sales)
    }
}

#[async_trait]
impl TenantDirectory for MemoryStore {
    async fn insert(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let taken = inner
            .tenants
            .values()
            .any(|t| t.name == tenant.name || t.domain == tenant.domain);
        if taken {
            return Err(StoreError::Duplicate("tenant name or domain"));
        }
        inner.tenants.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tenants.values().find(|t| t.name == name).cloned())
    }

    async fn find_by_name_or_domain(&self, identifier: &str) -> Result<Option<Tenant>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tenants
            .values()
            .find(|t| t.name == identifier || t.domain == identifier)
            .cloned())
    }

    async fn find_by_host(&self, host: &str) -> Result<Option<Tenant>, StoreError> {
        let inner = self.inner.lock().await;
        if let Some(tenant) = inner.tenants.values().find(|t| t.domain == host) {
            return Ok(Some(tenant.clone()));
        }
        Ok(subdomain_label(host)
            .and_then(|label| inner.tenants.values().find(|t| t.name == label))
            .cloned())
    }

    async fn set_active(&self, id: TenantId, active: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(tenant) = inner.tenants.get_mut(&id) {
            tenant.is_active = active;
            tenant.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn add_product(&self, product: &Product) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(
        &self,
        tenant_id: TenantId,
        id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .products
            .get(&id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn create_unpaid(
        &self,
        tenant_id: TenantId,
        customer: CustomerInfo,
        lines: &[CartLine],
    ) -> Result<Booking, StoreError> {
        let mut inner = self.inner.lock().await;

        let mut subtotal = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(lines.len());
        // Quantities claimed by earlier lines of this same cart; a cart
        // listing one product twice must not pass the check piecewise.
        let mut in_cart: HashMap<ProductId, u64> = HashMap::new();

        for line in lines {
            let product = match inner.products.get(&line.product_id) {
                Some(p) if p.tenant_id == tenant_id && p.is_active => p.clone(),
                _ => return Err(StoreError::ProductNotFound(line.product_id)),
            };

            if product.track_inventory {
                let claimed = inner.reserved(product.id)
                    + in_cart.get(&product.id).copied().unwrap_or(0);
                let available = i64::from(product.stock) - claimed as i64;
                if available < i64::from(line.quantity) && !product.allow_backorders {
                    return Err(StoreError::InsufficientStock(product.name));
                }
            }
            *in_cart.entry(product.id).or_insert(0) += u64::from(line.quantity);

            let unit_price = product.final_price();
            subtotal += unit_price * Decimal::from(line.quantity);
            snapshots.push((product, line.quantity, line.variant.clone(), unit_price));
        }

        let mut booking = Booking::create_unpaid(tenant_id, customer, subtotal);
        for (product, quantity, variant, unit_price) in snapshots {
            booking.items.push(BookingItem::snapshot(
                booking.id,
                tenant_id,
                product.id,
                &product.name,
                &product.sku,
                variant,
                &product.image_url,
                unit_price,
                quantity,
            ));
        }
        inner.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn attach_session(&self, id: BookingId, session_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .get_mut(&id)
            .ok_or(StoreError::BookingNotFound(id))?;
        booking.checkout_session_id = Some(session_id.to_string());
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn discard(&self, id: BookingId) -> Result<(), StoreError> {
        self.inner.lock().await.bookings.remove(&id);
        Ok(())
    }

    async fn find_for_tenant(
        &self,
        tenant_id: TenantId,
        id: BookingId,
    ) -> Result<Option<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .bookings
            .get(&id)
            .filter(|b| b.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_for_tenant(
        &self,
        tenant_id: TenantId,
        email: Option<&str>,
    ) -> Result<Vec<Booking>, StoreError> {
        let inner = self.inner.lock().await;
        let mut bookings: Vec<_> = inner
            .bookings
            .values()
            .filter(|b| b.tenant_id == tenant_id)
            .filter(|b| email.map_or(true, |e| b.customer.email == e))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn find_unscoped(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().await.bookings.get(&id).cloned())
    }

    async fn mark_paid(
        &self,
        id: BookingId,
        payment_intent: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = match inner.bookings.get(&id) {
            Some(b) => b.clone(),
            None => return Ok(None),
        };
        if !booking.status.can_transition(BookingStatus::Paid) {
            return Ok(None);
        }

        // Stock decrement and sales counters move with the status flip,
        // all under the same lock.
        for item in &booking.items {
            if let Some(product_id) = item.product_id {
                if let Some(product) = inner.products.get_mut(&product_id) {
                    if product.track_inventory {
                        product.stock = product.stock.saturating_sub(item.quantity);
                        product.total_sales += item.quantity;
                    }
                }
            }
        }

        let Some(booking) = inner.bookings.get_mut(&id) else {
            return Ok(None);
        };
        booking.status = BookingStatus::Paid;
        booking.payment_intent_id = Some(payment_intent.to_string());
        booking.paid_at = Some(at);
        booking.updated_at = at;
        Ok(Some(booking.clone()))
    }

    async fn mark_failed_by_intent(
        &self,
        payment_intent: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BookingId>, StoreError> {
        let mut inner = self.inner.lock().await;
        let booking = inner
            .bookings
            .values_mut()
            .find(|b| b.payment_intent_id.as_deref() == Some(payment_intent));
        match booking {
            Some(b) if b.status.can_transition(BookingStatus::Failed) => {
                b.status = BookingStatus::Failed;
                b.updated_at = at;
                Ok(Some(b.id))
            }
            _ => Ok(None),
        }
    }
}
