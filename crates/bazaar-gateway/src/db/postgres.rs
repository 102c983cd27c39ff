//! SQLx/PostgreSQL store implementations.
//!
//! Checkout creation and the `PAID` transition run inside transactions
//! with `FOR UPDATE` row locks on the product rows involved, so the stock
//! precondition cannot be invalidated by a concurrent checkout and the
//! stock decrement commits together with the status flip.

use std::collections::HashMap;

use async_trait::async_trait;
use bazaar_core::catalog::{DiscountKind, Product, ProductId};
use bazaar_core::order::{
    shipping_cost, Booking, BookingId, BookingItem, BookingStatus, CustomerInfo,
};
use bazaar_core::tenant::{Tenant, TenantId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{
    subdomain_label, BookingStore, CartLine, CatalogStore, StoreError, TenantDirectory,
    BOOKINGS_TABLE_SCHEMA, BOOKING_ITEMS_TABLE_SCHEMA, PRODUCTS_TABLE_SCHEMA,
    TENANTS_TABLE_SCHEMA,
};

/// Create a PostgreSQL connection pool.
pub async fn init_pool(database_url: &str) -> Result<PgPool, StoreError> {
    Ok(PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?)
}

/// Initialize required tables and indexes if they do not exist.
pub async fn initialize_schema(pool: &PgPool) -> Result<(), StoreError> {
    for schema in [
        TENANTS_TABLE_SCHEMA,
        PRODUCTS_TABLE_SCHEMA,
        BOOKINGS_TABLE_SCHEMA,
        BOOKING_ITEMS_TABLE_SCHEMA,
    ] {
        sqlx::raw_sql(schema).execute(pool).await?;
    }
    Ok(())
}

fn map_insert_err(e: sqlx::Error, what: &'static str) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return StoreError::Duplicate(what);
        }
    }
    StoreError::Database(e)
}

fn row_to_tenant(row: &PgRow) -> Tenant {
    Tenant {
        id: TenantId::from_uuid(row.get("id")),
        name: row.get("name"),
        domain: row.get("domain"),
        business_name: row.get("business_name"),
        email: row.get("email"),
        phone: row.get("phone"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_product(row: &PgRow) -> Product {
    let stock: i32 = row.get("stock");
    let total_sales: i32 = row.get("total_sales");
    let discount_kind: String = row.get("discount_kind");
    Product {
        id: ProductId::from_uuid(row.get("id")),
        tenant_id: TenantId::from_uuid(row.get("tenant_id")),
        name: row.get("name"),
        sku: row.get("sku"),
        short_description: row.get("short_description"),
        image_url: row.get("image_url"),
        price: row.get("price"),
        discount_kind: DiscountKind::parse(&discount_kind).unwrap_or_default(),
        discount_value: row.get("discount_value"),
        discount_start: row.get("discount_start"),
        discount_end: row.get("discount_end"),
        stock: stock.max(0) as u32,
        track_inventory: row.get("track_inventory"),
        allow_backorders: row.get("allow_backorders"),
        is_active: row.get("is_active"),
        total_sales: total_sales.max(0) as u32,
    }
}

fn row_to_booking(row: &PgRow) -> Booking {
    let status: String = row.get("status");
    Booking {
        id: BookingId::from_uuid(row.get("id")),
        tenant_id: TenantId::from_uuid(row.get("tenant_id")),
        customer: CustomerInfo {
            email: row.get("customer_email"),
            name: row.get("customer_name"),
            is_gift: row.get("is_gift"),
            gift_message: row.get("gift_message"),
        },
        status: BookingStatus::parse(&status).unwrap_or(BookingStatus::Unpaid),
        subtotal: row.get("subtotal"),
        shipping_cost: row.get("shipping_cost"),
        total: row.get("total"),
        checkout_session_id: row.get("checkout_session_id"),
        payment_intent_id: row.get("payment_intent_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        paid_at: row.get("paid_at"),
        items: Vec::new(),
    }
}

fn row_to_item(row: &PgRow) -> BookingItem {
    let quantity: i32 = row.get("quantity");
    let product_id: Option<Uuid> = row.get("product_id");
    BookingItem {
        booking_id: BookingId::from_uuid(row.get("booking_id")),
        tenant_id: TenantId::from_uuid(row.get("tenant_id")),
        product_id: product_id.map(ProductId::from_uuid),
        product_name: row.get("product_name"),
        product_sku: row.get("product_sku"),
        variant_name: row.get("variant_name"),
        product_image: row.get("product_image"),
        unit_price: row.get("unit_price"),
        quantity: quantity.max(0) as u32,
        line_total: row.get("line_total"),
    }
}

const SELECT_TENANT: &str = "SELECT id, name, domain, business_name, email, phone, is_active, created_at, updated_at FROM tenants";
const SELECT_PRODUCT: &str = "SELECT id, tenant_id, name, sku, short_description, image_url, price, discount_kind, discount_value, discount_start, discount_end, stock, track_inventory, allow_backorders, is_active, total_sales FROM products";
const SELECT_BOOKING: &str = "SELECT id, tenant_id, customer_email, customer_name, status, subtotal, shipping_cost, total, is_gift, gift_message, checkout_session_id, payment_intent_id, created_at, updated_at, paid_at FROM bookings";
const SELECT_ITEMS: &str = "SELECT booking_id, tenant_id, product_id, product_name, product_sku, variant_name, product_image, unit_price, quantity, line_total FROM booking_items";

/// SQLx/PostgreSQL implementation of [`TenantDirectory`].
#[derive(Debug, Clone)]
pub struct SqlxTenantDirectory {
    pool: PgPool,
}

impl SqlxTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for SqlxTenantDirectory {
    async fn insert(&self, tenant: &Tenant) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tenants (id, name, domain, business_name, email, phone, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(tenant.id.as_uuid())
        .bind(&tenant.name)
        .bind(&tenant.domain)
        .bind(&tenant.business_name)
        .bind(&tenant.email)
        .bind(&tenant.phone)
        .bind(tenant.is_active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "tenant name or domain"))?;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_TENANT} WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_tenant))
    }

    async fn find_by_name_or_domain(&self, identifier: &str) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_TENANT} WHERE name = $1 OR domain = $1"))
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_tenant))
    }

    async fn find_by_host(&self, host: &str) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_TENANT} WHERE domain = $1"))
            .bind(host)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            return Ok(Some(row_to_tenant(&row)));
        }
        match subdomain_label(host) {
            Some(label) => self.find_by_name(label).await,
            None => Ok(None),
        }
    }

    async fn set_active(&self, id: TenantId, active: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE tenants SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// SQLx/PostgreSQL implementation of [`CatalogStore`].
#[derive(Debug, Clone)]
pub struct SqlxCatalogStore {
    pool: PgPool,
}

impl SqlxCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for SqlxCatalogStore {
    async fn add_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO products (id, tenant_id, name, sku, short_description, image_url, price, \
             discount_kind, discount_value, discount_start, discount_end, stock, track_inventory, \
             allow_backorders, is_active, total_sales) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(product.id.as_uuid())
        .bind(product.tenant_id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.short_description)
        .bind(&product.image_url)
        .bind(product.price)
        .bind(product.discount_kind.as_str())
        .bind(product.discount_value)
        .bind(product.discount_start)
        .bind(product.discount_end)
        .bind(product.stock as i32)
        .bind(product.track_inventory)
        .bind(product.allow_backorders)
        .bind(product.is_active)
        .bind(product.total_sales as i32)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_err(e, "product"))?;
        Ok(())
    }

    async fn get_product(
        &self,
        tenant_id: TenantId,
        id: ProductId,
    ) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "{SELECT_PRODUCT} WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_product))
    }
}

/// SQLx/PostgreSQL implementation of [`BookingStore`].
#[derive(Debug, Clone)]
pub struct SqlxBookingStore {
    pool: PgPool,
}

impl SqlxBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_items(&self, booking: &mut Booking) -> Result<(), StoreError> {
        let rows = sqlx::query(&format!(
            "{SELECT_ITEMS} WHERE booking_id = $1 ORDER BY id ASC"
        ))
        .bind(booking.id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        booking.items = rows.iter().map(row_to_item).collect();
        Ok(())
    }
}

#[async_trait]
impl BookingStore for SqlxBookingStore {
    async fn create_unpaid(
        &self,
        tenant_id: TenantId,
        customer: CustomerInfo,
        lines: &[CartLine],
    ) -> Result<Booking, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut subtotal = Decimal::ZERO;
        let mut snapshots = Vec::with_capacity(lines.len());
        // Quantities claimed by earlier lines of this same cart; a cart
        // listing one product twice must not pass the check piecewise.
        let mut in_cart: HashMap<ProductId, i64> = HashMap::new();

        for line in lines {
            // Lock the product row for the duration of the checkout so a
            // concurrent checkout cannot read stale stock.
            let row = sqlx::query(&format!(
                "{SELECT_PRODUCT} WHERE id = $1 AND tenant_id = $2 FOR UPDATE"
            ))
            .bind(line.product_id.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;

            let product = match row.as_ref().map(row_to_product) {
                Some(p) if p.is_active => p,
                _ => return Err(StoreError::ProductNotFound(line.product_id)),
            };

            if product.track_inventory {
                let reserved: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(SUM(bi.quantity), 0) FROM booking_items bi \
                     JOIN bookings b ON b.id = bi.booking_id \
                     WHERE bi.product_id = $1 AND b.status IN ('UNPAID', 'PENDING')",
                )
                .bind(line.product_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;

                let claimed = reserved + in_cart.get(&product.id).copied().unwrap_or(0);
                let available = i64::from(product.stock) - claimed;
                if available < i64::from(line.quantity) && !product.allow_backorders {
                    return Err(StoreError::InsufficientStock(product.name));
                }
            }
            *in_cart.entry(product.id).or_insert(0) += i64::from(line.quantity);

            let unit_price = product.final_price();
            subtotal += unit_price * Decimal::from(line.quantity);
            snapshots.push((product, line.quantity, line.variant.clone(), unit_price));
        }

        let mut booking = Booking::create_unpaid(tenant_id, customer, subtotal);
        debug_assert_eq!(booking.shipping_cost, shipping_cost(subtotal));

        sqlx::query(
            "INSERT INTO bookings (id, tenant_id, customer_email, customer_name, status, subtotal, \
             shipping_cost, total, is_gift, gift_message, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(booking.id.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(&booking.customer.email)
        .bind(&booking.customer.name)
        .bind(booking.status.as_str())
        .bind(booking.subtotal)
        .bind(booking.shipping_cost)
        .bind(booking.total)
        .bind(booking.customer.is_gift)
        .bind(&booking.customer.gift_message)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *tx)
        .await?;

        for (product, quantity, variant, unit_price) in snapshots {
            let item = BookingItem::snapshot(
                booking.id,
                tenant_id,
                product.id,
                &product.name,
                &product.sku,
                variant,
                &product.image_url,
                unit_price,
                quantity,
            );
            sqlx::query(
                "INSERT INTO booking_items (booking_id, tenant_id, product_id, product_name, \
                 product_sku, variant_name, product_image, unit_price, quantity, line_total) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(booking.id.as_uuid())
            .bind(tenant_id.as_uuid())
            .bind(item.product_id.as_ref().map(|p| *p.as_uuid()))
            .bind(&item.product_name)
            .bind(&item.product_sku)
            .bind(&item.variant_name)
            .bind(&item.product_image)
            .bind(item.unit_price)
            .bind(item.quantity as i32)
            .bind(item.line_total)
            .execute(&mut *tx)
            .await?;
            booking.items.push(item);
        }

        tx.commit().await?;
        Ok(booking)
    }

    async fn attach_session(&self, id: BookingId, session_id: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE bookings SET checkout_session_id = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(session_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::BookingNotFound(id));
        }
        Ok(())
    }

    async fn discard(&self, id: BookingId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM bookings WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_for_tenant(
        &self,
        tenant_id: TenantId,
        id: BookingId,
    ) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(&format!(
            "{SELECT_BOOKING} WHERE id = $1 AND tenant_id = $2"
        ))
        .bind(id.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        match row.as_ref().map(row_to_booking) {
            Some(mut booking) => {
                self.load_items(&mut booking).await?;
                Ok(Some(booking))
            }
            None => Ok(None),
        }
    }

    async fn list_for_tenant(
        &self,
        tenant_id: TenantId,
        email: Option<&str>,
    ) -> Result<Vec<Booking>, StoreError> {
        let rows = match email {
            Some(email) => {
                sqlx::query(&format!(
                    "{SELECT_BOOKING} WHERE tenant_id = $1 AND customer_email = $2 ORDER BY created_at DESC"
                ))
                .bind(tenant_id.as_uuid())
                .bind(email)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "{SELECT_BOOKING} WHERE tenant_id = $1 ORDER BY created_at DESC"
                ))
                .bind(tenant_id.as_uuid())
                .fetch_all(&self.pool)
                .await?
            }
        };
        let mut bookings = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut booking = row_to_booking(row);
            self.load_items(&mut booking).await?;
            bookings.push(booking);
        }
        Ok(bookings)
    }

    async fn find_unscoped(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_BOOKING} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match row.as_ref().map(row_to_booking) {
            Some(mut booking) => {
                self.load_items(&mut booking).await?;
                Ok(Some(booking))
            }
            None => Ok(None),
        }
    }

    async fn mark_paid(
        &self,
        id: BookingId,
        payment_intent: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("{SELECT_BOOKING} WHERE id = $1 FOR UPDATE"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let mut booking = match row.as_ref().map(row_to_booking) {
            Some(b) => b,
            None => return Ok(None),
        };
        if !booking.status.can_transition(BookingStatus::Paid) {
            // Already PAID or otherwise terminal: replayed events are no-ops.
            return Ok(None);
        }

        sqlx::query(
            "UPDATE bookings SET status = 'PAID', payment_intent_id = $2, paid_at = $3, updated_at = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(payment_intent)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        let item_rows = sqlx::query(&format!(
            "{SELECT_ITEMS} WHERE booking_id = $1 ORDER BY id ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&mut *tx)
        .await?;
        let items: Vec<_> = item_rows.iter().map(row_to_item).collect();

        // Stock decrement and sales counters commit with the status flip.
        for item in &items {
            if let Some(product_id) = item.product_id {
                sqlx::query(
                    "UPDATE products SET stock = GREATEST(stock - $2, 0), total_sales = total_sales + $2 \
                     WHERE id = $1 AND track_inventory",
                )
                .bind(product_id.as_uuid())
                .bind(item.quantity as i32)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        booking.status = BookingStatus::Paid;
        booking.payment_intent_id = Some(payment_intent.to_string());
        booking.paid_at = Some(at);
        booking.updated_at = at;
        booking.items = items;
        Ok(Some(booking))
    }

    async fn mark_failed_by_intent(
        &self,
        payment_intent: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<BookingId>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "{SELECT_BOOKING} WHERE payment_intent_id = $1 FOR UPDATE"
        ))
        .bind(payment_intent)
        .fetch_optional(&mut *tx)
        .await?;
        let booking = match row.as_ref().map(row_to_booking) {
            Some(b) => b,
            None => return Ok(None),
        };
        if !booking.status.can_transition(BookingStatus::Failed) {
            return Ok(None);
        }

        sqlx::query("UPDATE bookings SET status = 'FAILED', updated_at = $2 WHERE id = $1")
            .bind(booking.id.as_uuid())
            .bind(at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(booking.id))
    }
}
