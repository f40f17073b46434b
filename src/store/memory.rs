//! In-memory settlement store.
//!
//! Backs tests and local demos. A single mutex around the whole state
//! gives `apply` the same all-or-nothing behavior the Postgres adapter
//! gets from a transaction: every mutation is validated before the first
//! one is made.

use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::aggregates::order::Order;
use crate::domain::catalog::ProductSnapshot;
use crate::domain::coupon::CouponSnapshot;
use crate::domain::loyalty::LoyaltyLedgerEntry;
use crate::error::{CheckoutError, Result};
use crate::ports::{CatalogLookup, CouponLookup, LedgerWriter, LoyaltyStore, OrderWriter, SettlementStore};
use crate::settlement::{RestorationPlan, SettlementPlan};

/// A catalog product plus its running sales counter.
#[derive(Clone, Debug)]
pub struct ProductRecord {
    pub product: ProductSnapshot,
    pub total_sales: i64,
}

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, ProductRecord>,
    coupons: HashMap<String, CouponSnapshot>,
    balances: HashMap<Uuid, i64>,
    ledger: Vec<LoyaltyLedgerEntry>,
    orders: HashMap<Uuid, Order>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, product: ProductSnapshot) {
        let mut inner = self.inner.lock().await;
        inner.products.insert(product.id, ProductRecord { product, total_sales: 0 });
    }

    pub async fn insert_coupon(&self, coupon: CouponSnapshot) {
        let mut inner = self.inner.lock().await;
        inner.coupons.insert(coupon.code.clone(), coupon);
    }

    pub async fn set_balance(&self, user_id: Uuid, points: i64) {
        let mut inner = self.inner.lock().await;
        inner.balances.insert(user_id, points);
    }

    pub async fn product_record(&self, id: Uuid) -> Option<ProductRecord> {
        self.inner.lock().await.products.get(&id).cloned()
    }

    pub async fn coupon_snapshot(&self, code: &str) -> Option<CouponSnapshot> {
        self.inner.lock().await.coupons.get(code).cloned()
    }

    pub async fn ledger_for(&self, user_id: Uuid) -> Vec<LoyaltyLedgerEntry> {
        self.inner
            .lock()
            .await
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

impl CatalogLookup for MemoryStore {
    async fn product(&self, id: Uuid) -> Result<Option<ProductSnapshot>> {
        Ok(self.inner.lock().await.products.get(&id).map(|r| r.product.clone()))
    }
}

impl CouponLookup for MemoryStore {
    async fn coupon(&self, code: &str) -> Result<Option<CouponSnapshot>> {
        Ok(self.inner.lock().await.coupons.get(code).cloned())
    }

    async fn increment_usage(&self, code: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let coupon = inner
            .coupons
            .get_mut(code)
            .ok_or_else(|| CheckoutError::CouponNotFound(code.to_string()))?;
        coupon.usage_count += 1;
        Ok(())
    }
}

impl LoyaltyStore for MemoryStore {
    async fn balance(&self, user_id: Uuid) -> Result<i64> {
        Ok(*self.inner.lock().await.balances.get(&user_id).unwrap_or(&0))
    }

    async fn adjust_balance(&self, user_id: Uuid, delta: i64) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let balance = inner.balances.entry(user_id).or_insert(0);
        *balance += delta;
        Ok(*balance)
    }
}

impl LedgerWriter for MemoryStore {
    async fn append_entry(&self, entry: &LoyaltyLedgerEntry) -> Result<()> {
        self.inner.lock().await.ledger.push(entry.clone());
        Ok(())
    }
}

impl OrderWriter for MemoryStore {
    async fn create_order(&self, order: &Order) -> Result<Uuid> {
        let mut inner = self.inner.lock().await;
        inner.orders.insert(order.id(), order.clone());
        Ok(order.id())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.lock().await.orders.get(&id).cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.orders.insert(order.id(), order.clone());
        Ok(())
    }
}

impl SettlementStore for MemoryStore {
    async fn apply(&self, plan: &SettlementPlan) -> Result<Uuid> {
        let mut inner = self.inner.lock().await;

        // Validate every decrement before mutating anything.
        for m in &plan.stock {
            let record = inner
                .products
                .get(&m.product_id)
                .ok_or(CheckoutError::ProductNotFound(m.product_id))?;
            if record.product.stock_available.subtract(m.quantity).is_none() {
                return Err(CheckoutError::OutOfStock {
                    sku: record.product.sku.clone(),
                    requested: m.quantity,
                    available: record.product.stock_available.value(),
                });
            }
        }

        for m in &plan.stock {
            let record = inner
                .products
                .get_mut(&m.product_id)
                .ok_or(CheckoutError::ProductNotFound(m.product_id))?;
            if let Some(remaining) = record.product.stock_available.subtract(m.quantity) {
                record.product.stock_available = remaining;
            }
            record.total_sales += i64::from(m.quantity);
        }

        for entry in &plan.ledger {
            let balance = inner.balances.entry(entry.user_id).or_insert(0);
            *balance += entry.points;
            let mut stored = entry.clone();
            stored.balance_after = *balance;
            inner.ledger.push(stored);
        }

        if let Some(code) = &plan.coupon_code {
            let coupon = inner
                .coupons
                .get_mut(code)
                .ok_or_else(|| CheckoutError::CouponNotFound(code.clone()))?;
            coupon.usage_count += 1;
        }

        inner.orders.insert(plan.order.id(), plan.order.clone());
        Ok(plan.order.id())
    }

    async fn apply_restoration(&self, plan: &RestorationPlan, order: &Order) -> Result<()> {
        let mut inner = self.inner.lock().await;

        for m in &plan.stock {
            let record = inner
                .products
                .get_mut(&m.product_id)
                .ok_or(CheckoutError::ProductNotFound(m.product_id))?;
            record.product.stock_available = record.product.stock_available.add(m.quantity);
            record.total_sales -= i64::from(m.quantity);
        }

        for entry in &plan.ledger {
            let balance = inner.balances.entry(entry.user_id).or_insert(0);
            *balance += entry.points;
            let mut stored = entry.clone();
            stored.balance_after = *balance;
            inner.ledger.push(stored);
        }

        inner.orders.insert(order.id(), order.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Money, Quantity, Sku};
    use crate::settlement::StockMutation;

    fn snapshot(stock: u32) -> ProductSnapshot {
        ProductSnapshot {
            id: Uuid::new_v4(),
            name: "Turmeric".into(),
            sku: Sku::new("TUR-01").unwrap(),
            unit_price: Money::from_units(120),
            stock_available: Quantity::new(stock),
            category_id: None,
            primary_image_url: None,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_apply_refuses_oversell_without_partial_mutation() {
        let store = MemoryStore::new();
        let ok = snapshot(10);
        let scarce = snapshot(1);
        store.insert_product(ok.clone()).await;
        store.insert_product(scarce.clone()).await;

        let quote = crate::pricing::OrderQuote {
            lines: vec![],
            subtotal: Money::from_units(360),
            discount: Money::ZERO,
            loyalty_points_used: 0,
            loyalty_points_earned: 0,
            shipping_cost: Money::from_units(50),
            tax: Money::from_units(18),
            total: Money::from_units(428),
        };
        let mut plan = crate::settlement::settle(&quote, Uuid::new_v4(), 0, None, "INR");
        plan.stock = vec![
            StockMutation { product_id: ok.id, quantity: 2 },
            StockMutation { product_id: scarce.id, quantity: 3 },
        ];

        let err = store.apply(&plan).await.unwrap_err();
        assert!(matches!(err, CheckoutError::OutOfStock { .. }));

        // first product untouched: validation ran before any decrement
        let record = store.product_record(ok.id).await.unwrap();
        assert_eq!(record.product.stock_available, Quantity::new(10));
        assert_eq!(record.total_sales, 0);
    }
}
