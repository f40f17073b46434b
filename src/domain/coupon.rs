//! Coupon read model and discount rules.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// A coupon as read from the coupon store at quote time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CouponSnapshot {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase_amount: Money,
    pub max_discount_amount: Option<Money>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub is_active: bool,
    /// When non-empty, at least one cart line must match by product.
    pub applicable_products: Vec<Uuid>,
    /// When non-empty, at least one cart line must match by category.
    pub applicable_categories: Vec<Uuid>,
}

impl CouponSnapshot {
    /// Active, inside its validity window, with usage headroom.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active { return false; }
        if now < self.starts_at || now > self.expires_at { return false; }
        if let Some(limit) = self.usage_limit {
            if self.usage_count >= limit { return false; }
        }
        true
    }

    /// Scoping check: an unscoped coupon applies to any cart; a scoped one
    /// needs at least one matching line (by product id or category id).
    pub fn applies_to(&self, lines: &[(Uuid, Option<Uuid>)]) -> bool {
        if self.applicable_products.is_empty() && self.applicable_categories.is_empty() {
            return true;
        }
        lines.iter().any(|(product_id, category_id)| {
            self.applicable_products.contains(product_id)
                || category_id.is_some_and(|c| self.applicable_categories.contains(&c))
        })
    }

    /// Discount against `subtotal`: percentage clamped to the optional
    /// maximum, fixed taken as-is; never more than the subtotal itself.
    pub fn discount_for(&self, subtotal: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = subtotal.percent(self.discount_value);
                match self.max_discount_amount {
                    Some(cap) => pct.min(cap),
                    None => pct,
                }
            }
            DiscountType::Fixed => Money::new(self.discount_value),
        };
        raw.min(subtotal)
    }
}
