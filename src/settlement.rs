//! Settlement planning.
//!
//! `settle` converts a priced quote into a declarative plan of every
//! mutation the checkout must commit: the order record, the per-line
//! stock decrements, the loyalty ledger entries, and the coupon usage
//! bump. The plan performs no I/O itself; a storage adapter applies it as
//! one atomic unit, or not at all.

use serde::Serialize;
use uuid::Uuid;

use crate::config::PricingPolicy;
use crate::domain::aggregates::order::Order;
use crate::domain::loyalty::LoyaltyLedgerEntry;
use crate::error::{CheckoutError, Result};
use crate::pricing::OrderQuote;

/// One product's stock adjustment. On settlement the quantity is
/// subtracted from stock and added to the sales counter; restoration
/// applies the inverse.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockMutation {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Everything a successful checkout commits, in application order.
#[derive(Clone, Debug)]
pub struct SettlementPlan {
    pub order: Order,
    pub stock: Vec<StockMutation>,
    /// Redemption entry first (if any), then the award entry. Ordering is
    /// what makes each `balance_after` reconstructable from the ledger.
    pub ledger: Vec<LoyaltyLedgerEntry>,
    /// Coupon whose usage count the settlement consumes.
    pub coupon_code: Option<String>,
}

/// Build the settlement plan for a quote.
///
/// `loyalty_balance` is the user's balance as read when the quote was
/// computed; ledger `balance_after` values are derived from it by applying
/// redemption and award in sequence.
pub fn settle(
    quote: &OrderQuote,
    user_id: Uuid,
    loyalty_balance: i64,
    coupon_code: Option<String>,
    currency: &str,
) -> SettlementPlan {
    let order = Order::place(user_id, quote, coupon_code.clone(), currency);

    let stock = quote
        .lines
        .iter()
        .map(|line| StockMutation { product_id: line.product_id, quantity: line.quantity })
        .collect();

    let mut ledger = Vec::with_capacity(2);
    let mut balance = loyalty_balance;
    if quote.loyalty_points_used > 0 {
        balance -= quote.loyalty_points_used;
        ledger.push(LoyaltyLedgerEntry::redeemed(
            user_id,
            quote.loyalty_points_used,
            order.id(),
            order.order_number(),
            balance,
        ));
    }
    balance += quote.loyalty_points_earned;
    ledger.push(LoyaltyLedgerEntry::earned(
        user_id,
        quote.loyalty_points_earned,
        order.id(),
        order.order_number(),
        balance,
    ));

    SettlementPlan { order, stock, ledger, coupon_code }
}

/// The stock (and optionally loyalty) inverse of a settlement.
#[derive(Clone, Debug)]
pub struct RestorationPlan {
    pub order_id: Uuid,
    pub stock: Vec<StockMutation>,
    /// Empty unless `reverse_loyalty_on_cancel` is enabled.
    pub ledger: Vec<LoyaltyLedgerEntry>,
}

/// Build the restoration plan for cancelling `order`.
///
/// Stock always comes back. Loyalty entries are left standing by default,
/// matching storefront policy; enabling `reverse_loyalty_on_cancel` adds
/// compensating `adjusted` entries that refund redeemed points and revoke
/// the award.
pub fn restoration_for(
    order: &Order,
    loyalty_balance: i64,
    policy: &PricingPolicy,
) -> Result<RestorationPlan> {
    if !order.status().can_cancel() {
        return Err(CheckoutError::CannotCancel(order.status()));
    }

    let stock = order
        .items()
        .iter()
        .map(|line| StockMutation { product_id: line.product_id, quantity: line.quantity })
        .collect();

    let mut ledger = Vec::new();
    if policy.reverse_loyalty_on_cancel {
        let mut balance = loyalty_balance;
        if order.loyalty_points_used() > 0 {
            balance += order.loyalty_points_used();
            ledger.push(LoyaltyLedgerEntry::adjusted(
                order.user_id(),
                order.loyalty_points_used(),
                order.id(),
                format!("Points refunded for cancelled order {}", order.order_number()),
                balance,
            ));
        }
        if order.loyalty_points_earned() > 0 {
            balance -= order.loyalty_points_earned();
            ledger.push(LoyaltyLedgerEntry::adjusted(
                order.user_id(),
                -order.loyalty_points_earned(),
                order.id(),
                format!("Points revoked for cancelled order {}", order.order_number()),
                balance,
            ));
        }
    }

    Ok(RestorationPlan { order_id: order.id(), stock, ledger })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::{LineItem, OrderStatus};
    use crate::domain::loyalty::LedgerEntryType;
    use crate::domain::value_objects::{Money, Sku};

    fn quote(points_used: i64, points_earned: i64) -> OrderQuote {
        OrderQuote {
            lines: vec![
                LineItem {
                    product_id: Uuid::new_v4(),
                    name: "Saffron".into(),
                    sku: Sku::new("SAF-01").unwrap(),
                    image_url: None,
                    variant: None,
                    quantity: 2,
                    unit_price: Money::from_units(450),
                    line_total: Money::from_units(900),
                },
                LineItem {
                    product_id: Uuid::new_v4(),
                    name: "Cardamom".into(),
                    sku: Sku::new("CAR-02").unwrap(),
                    image_url: None,
                    variant: Some("50g".into()),
                    quantity: 1,
                    unit_price: Money::from_units(100),
                    line_total: Money::from_units(100),
                },
            ],
            subtotal: Money::from_units(1000),
            discount: Money::ZERO,
            loyalty_points_used: points_used,
            loyalty_points_earned: points_earned,
            shipping_cost: Money::ZERO,
            tax: Money::from_units(50),
            total: Money::from_units(1050 - points_used),
        }
    }

    #[test]
    fn test_plan_mirrors_quote_lines() {
        let plan = settle(&quote(0, 10), Uuid::new_v4(), 0, None, "INR");
        assert_eq!(plan.stock.len(), 2);
        assert_eq!(plan.stock[0].quantity, 2);
        assert_eq!(plan.order.status(), OrderStatus::Pending);
        assert_eq!(plan.order.total(), Money::from_units(1050));
    }

    #[test]
    fn test_ledger_orders_redemption_before_award() {
        let user = Uuid::new_v4();
        let plan = settle(&quote(100, 9), user, 500, None, "INR");

        assert_eq!(plan.ledger.len(), 2);
        let redeemed = &plan.ledger[0];
        let earned = &plan.ledger[1];
        assert_eq!(redeemed.entry_type, LedgerEntryType::Redeemed);
        assert_eq!(redeemed.points, -100);
        assert_eq!(redeemed.balance_after, 400);
        assert_eq!(earned.entry_type, LedgerEntryType::Earned);
        assert_eq!(earned.points, 9);
        assert_eq!(earned.balance_after, 409);
    }

    #[test]
    fn test_award_entry_always_present() {
        let plan = settle(&quote(0, 10), Uuid::new_v4(), 0, None, "INR");
        assert_eq!(plan.ledger.len(), 1);
        assert_eq!(plan.ledger[0].entry_type, LedgerEntryType::Earned);
        assert_eq!(plan.ledger[0].balance_after, 10);
    }

    #[test]
    fn test_restoration_is_stock_inverse() {
        let plan = settle(&quote(0, 10), Uuid::new_v4(), 0, None, "INR");
        let restoration = restoration_for(&plan.order, 10, &PricingPolicy::default()).unwrap();
        assert_eq!(restoration.stock, plan.stock);
        assert!(restoration.ledger.is_empty());
    }

    #[test]
    fn test_restoration_refused_after_shipping() {
        let staff = Uuid::new_v4();
        let mut plan = settle(&quote(0, 10), Uuid::new_v4(), 0, None, "INR");
        plan.order.update_status(OrderStatus::Confirmed, None, staff).unwrap();
        plan.order.update_status(OrderStatus::Processing, None, staff).unwrap();

        let err = restoration_for(&plan.order, 10, &PricingPolicy::default()).unwrap_err();
        assert!(matches!(err, CheckoutError::CannotCancel(OrderStatus::Processing)));
    }

    #[test]
    fn test_loyalty_reversal_when_policy_enabled() {
        let user = Uuid::new_v4();
        let plan = settle(&quote(100, 9), user, 500, None, "INR");
        // balance after settlement: 500 - 100 + 9
        let policy = PricingPolicy { reverse_loyalty_on_cancel: true, ..PricingPolicy::default() };
        let restoration = restoration_for(&plan.order, 409, &policy).unwrap();

        assert_eq!(restoration.ledger.len(), 2);
        assert_eq!(restoration.ledger[0].points, 100);
        assert_eq!(restoration.ledger[0].balance_after, 509);
        assert_eq!(restoration.ledger[1].points, -9);
        assert_eq!(restoration.ledger[1].balance_after, 500);
    }
}
