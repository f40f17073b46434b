//! Order pricing.
//!
//! `PricingEngine::quote` turns a cart plus fresh catalog snapshots into a
//! priced, not-yet-committed quote. It is a pure computation: same inputs
//! and same clock, same quote. All lookups happen before it runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PricingPolicy;
use crate::domain::aggregates::order::LineItem;
use crate::domain::catalog::ProductSnapshot;
use crate::domain::coupon::CouponSnapshot;
use crate::domain::value_objects::Money;
use crate::error::{CheckoutError, Result};

/// One product/quantity entry submitted for checkout. Ephemeral; prices
/// and stock are always resolved fresh against the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    pub variant: Option<String>,
}

/// The computed pricing result for a cart.
///
/// Invariant: `total = subtotal - discount - points_used + shipping + tax`,
/// and `total >= 0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderQuote {
    pub lines: Vec<LineItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub loyalty_points_used: i64,
    pub loyalty_points_earned: i64,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Clone, Debug)]
pub struct PricingEngine {
    policy: PricingPolicy,
}

impl PricingEngine {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Price a cart. `items` pairs each cart line with the product
    /// snapshot resolved for it, in cart order; `coupon` has already been
    /// looked up by code; `now` drives coupon validity.
    pub fn quote(
        &self,
        items: &[(CartLine, ProductSnapshot)],
        coupon: Option<&CouponSnapshot>,
        loyalty_balance: i64,
        redeem_points: bool,
        now: DateTime<Utc>,
    ) -> Result<OrderQuote> {
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(items.len());
        let mut subtotal = Money::ZERO;
        for (line, product) in items {
            if !product.is_active {
                return Err(CheckoutError::ProductNotFound(product.id));
            }
            if line.quantity == 0 {
                return Err(CheckoutError::InvalidQuantity(product.id));
            }
            if !product.has_stock_for(line.quantity) {
                return Err(CheckoutError::OutOfStock {
                    sku: product.sku.clone(),
                    requested: line.quantity,
                    available: product.stock_available.value(),
                });
            }
            let line_total = product.unit_price.mul_qty(line.quantity);
            subtotal += line_total;
            lines.push(LineItem {
                product_id: product.id,
                name: product.name.clone(),
                sku: product.sku.clone(),
                image_url: product.primary_image_url.clone(),
                variant: line.variant.clone(),
                quantity: line.quantity,
                unit_price: product.unit_price,
                line_total,
            });
        }

        let discount = match coupon {
            Some(c) => {
                if !c.is_valid_at(now) {
                    return Err(CheckoutError::CouponInvalid(c.code.clone()));
                }
                if subtotal < c.min_purchase_amount {
                    return Err(CheckoutError::CouponBelowMinimum {
                        code: c.code.clone(),
                        minimum: c.min_purchase_amount,
                    });
                }
                let scope: Vec<(Uuid, Option<Uuid>)> =
                    items.iter().map(|(_, p)| (p.id, p.category_id)).collect();
                if !c.applies_to(&scope) {
                    return Err(CheckoutError::CouponNotApplicable(c.code.clone()));
                }
                c.discount_for(subtotal)
            }
            None => Money::ZERO,
        };

        // Redemption is capped at a share of subtotal; 1 point = 1 unit.
        let loyalty_points_used = if redeem_points && loyalty_balance > 0 {
            loyalty_balance.min(subtotal.percent(self.policy.redemption_cap_percent).floor_units())
        } else {
            0
        };

        let shipping_cost = if subtotal >= self.policy.free_shipping_threshold {
            Money::ZERO
        } else {
            self.policy.flat_shipping_cost
        };
        let tax = subtotal.percent(self.policy.tax_rate_percent);

        let total = subtotal - discount - Money::from_units(loyalty_points_used) + shipping_cost + tax;
        if total.is_negative() {
            return Err(CheckoutError::InvalidTotal(total));
        }

        // Points accrue on the final charged total, so redeeming points
        // lowers the award for the same order.
        let loyalty_points_earned = total.div_floor(self.policy.loyalty_earn_divisor);

        Ok(OrderQuote {
            lines,
            subtotal,
            discount,
            loyalty_points_used,
            loyalty_points_earned,
            shipping_cost,
            tax,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coupon::DiscountType;
    use crate::domain::value_objects::{Quantity, Sku};
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn product(price: i64, stock: u32) -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            name: "Kashmiri Saffron".into(),
            sku: Sku::new("SPICE-SAF-01").unwrap(),
            unit_price: Money::from_units(price),
            stock_available: Quantity::new(stock),
            category_id: Some(Uuid::new_v4()),
            primary_image_url: None,
            is_active: true,
        }
    }

    fn cart(product: &ProductSnapshot, quantity: u32) -> (CartLine, ProductSnapshot) {
        (CartLine { product_id: product.id, quantity, variant: None }, product.clone())
    }

    fn coupon(code: &str, discount_type: DiscountType, value: i64, min: i64, max: Option<i64>) -> CouponSnapshot {
        let now = Utc::now();
        CouponSnapshot {
            code: code.into(),
            discount_type,
            discount_value: Decimal::from(value),
            min_purchase_amount: Money::from_units(min),
            max_discount_amount: max.map(Money::from_units),
            starts_at: now - Duration::days(1),
            expires_at: now + Duration::days(30),
            usage_limit: None,
            usage_count: 0,
            is_active: true,
            applicable_products: vec![],
            applicable_categories: vec![],
        }
    }

    fn engine() -> PricingEngine {
        PricingEngine::new(PricingPolicy::default())
    }

    #[test]
    fn test_free_shipping_above_threshold() {
        // subtotal 1000: shipping waived, 5% tax
        let p = product(500, 10);
        let quote = engine().quote(&[cart(&p, 2)], None, 0, false, Utc::now()).unwrap();
        assert_eq!(quote.subtotal, Money::from_units(1000));
        assert_eq!(quote.shipping_cost, Money::ZERO);
        assert_eq!(quote.tax, Money::from_units(50));
        assert_eq!(quote.total, Money::from_units(1050));
        assert_eq!(quote.loyalty_points_earned, 10);
    }

    #[test]
    fn test_flat_shipping_below_threshold() {
        let p = product(400, 10);
        let quote = engine().quote(&[cart(&p, 1)], None, 0, false, Utc::now()).unwrap();
        assert_eq!(quote.shipping_cost, Money::from_units(50));
        assert_eq!(quote.tax, Money::from_units(20));
        assert_eq!(quote.total, Money::from_units(470));
    }

    #[test]
    fn test_percentage_coupon_with_cap() {
        let p = product(1000, 10);
        let c = coupon("WELCOME25", DiscountType::Percentage, 25, 500, Some(250));
        let quote = engine().quote(&[cart(&p, 1)], Some(&c), 0, false, Utc::now()).unwrap();
        assert_eq!(quote.discount, Money::from_units(250));
        assert_eq!(quote.total, Money::from_units(800));
    }

    #[test]
    fn test_redemption_capped_at_ten_percent_of_subtotal() {
        let p = product(1000, 10);
        let quote = engine().quote(&[cart(&p, 1)], None, 500, true, Utc::now()).unwrap();
        assert_eq!(quote.loyalty_points_used, 100);
        assert_eq!(quote.total, Money::from_units(950));
        // earned points compound on the post-redemption total
        assert_eq!(quote.loyalty_points_earned, 9);
    }

    #[test]
    fn test_redemption_limited_by_balance() {
        let p = product(1000, 10);
        let quote = engine().quote(&[cart(&p, 1)], None, 40, true, Utc::now()).unwrap();
        assert_eq!(quote.loyalty_points_used, 40);
    }

    #[test]
    fn test_no_redemption_without_opt_in() {
        let p = product(1000, 10);
        let quote = engine().quote(&[cart(&p, 1)], None, 500, false, Utc::now()).unwrap();
        assert_eq!(quote.loyalty_points_used, 0);
    }

    #[test]
    fn test_out_of_stock_rejected() {
        let p = product(100, 3);
        let err = engine().quote(&[cart(&p, 5)], None, 0, false, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::OutOfStock { requested: 5, available: 3, .. }));
    }

    #[test]
    fn test_inactive_product_rejected() {
        let mut p = product(100, 10);
        p.is_active = false;
        let err = engine().quote(&[cart(&p, 1)], None, 0, false, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::ProductNotFound(_)));
    }

    #[test]
    fn test_empty_cart_rejected() {
        let err = engine().quote(&[], None, 0, false, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[test]
    fn test_coupon_below_minimum_purchase() {
        let p = product(900, 10);
        let c = coupon("FLAT100", DiscountType::Fixed, 100, 1000, None);
        let err = engine().quote(&[cart(&p, 1)], Some(&c), 0, false, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponBelowMinimum { .. }));
    }

    #[test]
    fn test_expired_coupon_rejected() {
        let p = product(1000, 10);
        let mut c = coupon("WELCOME25", DiscountType::Percentage, 25, 500, Some(250));
        c.expires_at = Utc::now() - Duration::days(1);
        let err = engine().quote(&[cart(&p, 1)], Some(&c), 0, false, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponInvalid(_)));
    }

    #[test]
    fn test_scoped_coupon_mismatch_rejected() {
        let p = product(1000, 10);
        let mut c = coupon("SPICE10", DiscountType::Percentage, 10, 0, None);
        c.applicable_products = vec![Uuid::new_v4()];
        let err = engine().quote(&[cart(&p, 1)], Some(&c), 0, false, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::CouponNotApplicable(_)));
    }

    #[test]
    fn test_discount_never_exceeds_subtotal() {
        let p = product(60, 10);
        let c = coupon("FLAT100", DiscountType::Fixed, 100, 0, None);
        let quote = engine().quote(&[cart(&p, 1)], Some(&c), 0, false, Utc::now()).unwrap();
        assert_eq!(quote.discount, Money::from_units(60));
        // 60 - 60 + 50 shipping + 3 tax
        assert_eq!(quote.total, Money::from_units(53));
    }

    #[test]
    fn test_negative_total_fails_rather_than_clamps() {
        // full-subtotal discount plus redemption drives the total negative
        let p = product(1000, 10);
        let c = coupon("FLAT1000", DiscountType::Fixed, 1000, 0, None);
        let err = engine().quote(&[cart(&p, 1)], Some(&c), 100, true, Utc::now()).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidTotal(_)));
    }

    #[test]
    fn test_quote_is_deterministic() {
        let p1 = product(199, 10);
        let p2 = product(301, 10);
        let now = Utc::now();
        let items = [cart(&p1, 3), cart(&p2, 1)];
        let a = engine().quote(&items, None, 120, true, now).unwrap();
        let b = engine().quote(&items, None, 120, true, now).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.subtotal, Money::from_units(898));
    }

    #[test]
    fn test_multi_line_subtotal_is_exact() {
        let p1 = product(199, 10);
        let p2 = product(301, 10);
        let quote = engine().quote(&[cart(&p1, 2), cart(&p2, 1)], None, 0, false, Utc::now()).unwrap();
        let line_sum: Money = quote.lines.iter().map(|l| l.line_total).sum();
        assert_eq!(line_sum, quote.subtotal);
        assert_eq!(quote.subtotal, Money::from_units(699));
    }
}
