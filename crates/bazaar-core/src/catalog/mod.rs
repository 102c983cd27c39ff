//! Catalog read model.
//!
//! Checkout consumes the catalog through this model only; its computed
//! price is the single trusted price at purchase time. Catalog CRUD and
//! search live outside this crate.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(Uuid);

impl ProductId {
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

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    None,
    Percentage,
    Fixed,
}

impl Default for DiscountKind {
    fn default() -> Self {
        DiscountKind::None
    }
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::None => "none",
            DiscountKind::Percentage => "percentage",
            DiscountKind::Fixed => "fixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(DiscountKind::None),
            "percentage" => Some(DiscountKind::Percentage),
            "fixed" => Some(DiscountKind::Fixed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    /// Owning tenant, set at creation and never reassigned.
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub image_url: String,
    /// List price before discounts.
    pub price: Decimal,
    #[serde(default)]
    pub discount_kind: DiscountKind,
    #[serde(default)]
    pub discount_value: Decimal,
    #[serde(default)]
    pub discount_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub discount_end: Option<DateTime<Utc>>,
    pub stock: u32,
    pub track_inventory: bool,
    #[serde(default)]
    pub allow_backorders: bool,
    pub is_active: bool,
    #[serde(default)]
    pub total_sales: u32,
}

/// Lowest price a discount can produce.
const PRICE_FLOOR: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

impl Product {
    pub fn new(tenant_id: TenantId, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: ProductId::new(),
            tenant_id,
            name: name.into(),
            sku: String::new(),
            short_description: String::new(),
            image_url: String::new(),
            price,
            discount_kind: DiscountKind::None,
            discount_value: Decimal::ZERO,
            discount_start: None,
            discount_end: None,
            stock: 0,
            track_inventory: true,
            allow_backorders: false,
            is_active: true,
            total_sales: 0,
        }
    }

    /// Current computed price after discounts. This is the price
    /// authority: checkout never accepts a client-supplied price.
    pub fn final_price(&self) -> Decimal {
        self.final_price_at(Utc::now())
    }

    pub fn final_price_at(&self, now: DateTime<Utc>) -> Decimal {
        if self.discount_kind == DiscountKind::None || self.discount_value <= Decimal::ZERO {
            return self.price;
        }
        if let Some(start) = self.discount_start {
            if now < start {
                return self.price;
            }
        }
        if let Some(end) = self.discount_end {
            if now > end {
                return self.price;
            }
        }
        let discounted = match self.discount_kind {
            DiscountKind::Percentage => {
                self.price - self.price * (self.discount_value / Decimal::ONE_HUNDRED)
            }
            DiscountKind::Fixed => self.price - self.discount_value,
            DiscountKind::None => self.price,
        };
        discounted.max(PRICE_FLOOR).round_dp(2)
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.track_inventory && self.stock == 0
    }

    pub fn can_purchase(&self) -> bool {
        if !self.is_active {
            return false;
        }
        if self.track_inventory && self.stock == 0 && !self.allow_backorders {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn product(price: Decimal) -> Product {
        Product::new(TenantId::new(), "Ceramic Mug", price)
    }

    #[test]
    fn final_price_without_discount_is_list_price() {
        let p = product(Decimal::new(5000, 2));
        assert_eq!(p.final_price(), Decimal::new(5000, 2));
    }

    #[test]
    fn percentage_discount_applies_inside_window() {
        let mut p = product(Decimal::new(10000, 2));
        p.discount_kind = DiscountKind::Percentage;
        p.discount_value = Decimal::new(20, 0);
        p.discount_start = Some(Utc::now() - Duration::hours(1));
        p.discount_end = Some(Utc::now() + Duration::hours(1));
        assert_eq!(p.final_price(), Decimal::new(8000, 2));
    }

    #[test]
    fn fixed_discount_applies() {
        let mut p = product(Decimal::new(10000, 2));
        p.discount_kind = DiscountKind::Fixed;
        p.discount_value = Decimal::new(1550, 2);
        assert_eq!(p.final_price(), Decimal::new(8450, 2));
    }

    #[test]
    fn discount_outside_window_is_ignored() {
        let mut p = product(Decimal::new(10000, 2));
        p.discount_kind = DiscountKind::Percentage;
        p.discount_value = Decimal::new(50, 0);
        p.discount_end = Some(Utc::now() - Duration::hours(1));
        assert_eq!(p.final_price(), Decimal::new(10000, 2));
    }

    #[test]
    fn discount_never_prices_below_floor() {
        let mut p = product(Decimal::new(500, 2));
        p.discount_kind = DiscountKind::Fixed;
        p.discount_value = Decimal::new(99900, 2);
        assert_eq!(p.final_price(), Decimal::new(1, 2));
    }

    #[test]
    fn inactive_product_cannot_be_purchased() {
        let mut p = product(Decimal::new(500, 2));
        p.is_active = false;
        assert!(!p.can_purchase());
    }

    #[test]
    fn out_of_stock_blocks_purchase_unless_backorders_allowed() {
        let mut p = product(Decimal::new(500, 2));
        p.stock = 0;
        assert!(!p.can_purchase());
        p.allow_backorders = true;
        assert!(p.can_purchase());
    }

    #[test]
    fn untracked_inventory_is_never_out_of_stock() {
        let mut p = product(Decimal::new(500, 2));
        p.track_inventory = false;
        p.stock = 0;
        assert!(!p.is_out_of_stock());
        assert!(p.can_purchase());
    }
}
