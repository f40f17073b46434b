//! Postgres settlement store.
//!
//! All plan mutations run inside one database transaction. Stock
//! decrements are conditional (`AND stock >= $qty`), so two checkouts
//! racing over the same shelf cannot both win: the loser rolls back with
//! `OutOfStock` and no partial writes survive.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::aggregates::order::{LineItem, Order, StatusChange, StoredOrder};
use crate::domain::catalog::ProductSnapshot;
use crate::domain::coupon::{CouponSnapshot, DiscountType};
use crate::domain::loyalty::{LedgerEntryType, LoyaltyLedgerEntry};
use crate::domain::value_objects::{Money, Quantity, Sku};
use crate::error::{CheckoutError, Result};
use crate::ports::{CatalogLookup, CouponLookup, LedgerWriter, LoyaltyStore, OrderWriter, SettlementStore};
use crate::settlement::{RestorationPlan, SettlementPlan, StockMutation};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CheckoutError::Storage(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    price: Decimal,
    stock: i32,
    category_id: Option<Uuid>,
    image_url: Option<String>,
    status: String,
}

impl ProductRow {
    fn into_snapshot(self) -> Result<ProductSnapshot> {
        Ok(ProductSnapshot {
            id: self.id,
            name: self.name,
            sku: Sku::new(self.sku).map_err(|e| CheckoutError::Storage(e.to_string()))?,
            unit_price: Money::new(self.price),
            stock_available: Quantity::new(self.stock.max(0) as u32),
            category_id: self.category_id,
            primary_image_url: self.image_url,
            is_active: self.status == "active",
        })
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    code: String,
    discount_type: String,
    discount_value: Decimal,
    min_purchase: Decimal,
    max_discount: Option<Decimal>,
    starts_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    usage_limit: Option<i32>,
    usage_count: i32,
    is_active: bool,
    applicable_products: Vec<Uuid>,
    applicable_categories: Vec<Uuid>,
}

impl CouponRow {
    fn into_snapshot(self) -> Result<CouponSnapshot> {
        let discount_type = match self.discount_type.as_str() {
            "percentage" => DiscountType::Percentage,
            "fixed" => DiscountType::Fixed,
            other => return Err(CheckoutError::Storage(format!("unknown discount type: {other}"))),
        };
        Ok(CouponSnapshot {
            code: self.code,
            discount_type,
            discount_value: self.discount_value,
            min_purchase_amount: Money::new(self.min_purchase),
            max_discount_amount: self.max_discount.map(Money::new),
            starts_at: self.starts_at,
            expires_at: self.expires_at,
            usage_limit: self.usage_limit.map(|l| l.max(0) as u32),
            usage_count: self.usage_count.max(0) as u32,
            is_active: self.is_active,
            applicable_products: self.applicable_products,
            applicable_categories: self.applicable_categories,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: String,
    subtotal: Decimal,
    discount: Decimal,
    shipping_cost: Decimal,
    tax: Decimal,
    total: Decimal,
    loyalty_points_used: i64,
    loyalty_points_earned: i64,
    coupon_code: Option<String>,
    currency: String,
    cancel_reason: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    status_history: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    product_id: Uuid,
    sku: String,
    name: String,
    image_url: Option<String>,
    variant: Option<String>,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
}

impl OrderItemRow {
    fn into_line_item(self) -> Result<LineItem> {
        Ok(LineItem {
            product_id: self.product_id,
            name: self.name,
            sku: Sku::new(self.sku).map_err(|e| CheckoutError::Storage(e.to_string()))?,
            image_url: self.image_url,
            variant: self.variant,
            quantity: self.quantity.max(0) as u32,
            unit_price: Money::new(self.unit_price),
            line_total: Money::new(self.line_total),
        })
    }
}

fn order_from_rows(row: OrderRow, item_rows: Vec<OrderItemRow>) -> Result<Order> {
    let status = row
        .status
        .parse()
        .map_err(|e: String| CheckoutError::Storage(e))?;
    let status_history: Vec<StatusChange> = serde_json::from_value(row.status_history)
        .map_err(|e| CheckoutError::Storage(e.to_string()))?;
    let mut items = Vec::with_capacity(item_rows.len());
    for item in item_rows {
        items.push(item.into_line_item()?);
    }
    Ok(Order::from_stored(StoredOrder {
        id: row.id,
        order_number: row.order_number,
        user_id: row.user_id,
        status,
        items,
        subtotal: Money::new(row.subtotal),
        discount: Money::new(row.discount),
        shipping_cost: Money::new(row.shipping_cost),
        tax: Money::new(row.tax),
        total: Money::new(row.total),
        loyalty_points_used: row.loyalty_points_used,
        loyalty_points_earned: row.loyalty_points_earned,
        coupon_code: row.coupon_code,
        currency: row.currency,
        cancel_reason: row.cancel_reason,
        delivered_at: row.delivered_at,
        status_history,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

async fn insert_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
    let history = serde_json::to_value(order.status_history())
        .map_err(|e| CheckoutError::Storage(e.to_string()))?;
    sqlx::query(
        "INSERT INTO orders (id, order_number, user_id, status, subtotal, discount, shipping_cost, tax, total, \
         loyalty_points_used, loyalty_points_earned, coupon_code, currency, cancel_reason, delivered_at, \
         status_history, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
    )
    .bind(order.id())
    .bind(order.order_number())
    .bind(order.user_id())
    .bind(order.status().to_string())
    .bind(order.subtotal().amount())
    .bind(order.discount().amount())
    .bind(order.shipping_cost().amount())
    .bind(order.tax().amount())
    .bind(order.total().amount())
    .bind(order.loyalty_points_used())
    .bind(order.loyalty_points_earned())
    .bind(order.coupon_code())
    .bind(order.currency())
    .bind(order.cancel_reason())
    .bind(order.delivered_at())
    .bind(history)
    .bind(order.created_at())
    .bind(order.updated_at())
    .execute(&mut **tx)
    .await?;

    for (position, item) in order.items().iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, position, product_id, sku, name, image_url, variant, \
             quantity, unit_price, line_total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id())
        .bind(position as i32)
        .bind(item.product_id)
        .bind(item.sku.as_str())
        .bind(&item.name)
        .bind(&item.image_url)
        .bind(&item.variant)
        .bind(item.quantity as i32)
        .bind(item.unit_price.amount())
        .bind(item.line_total.amount())
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Conditional decrement: refuses to take stock below zero.
async fn decrement_stock(tx: &mut Transaction<'_, Postgres>, m: &StockMutation) -> Result<()> {
    let affected = sqlx::query(
        "UPDATE products SET stock = stock - $2, total_sales = total_sales + $2, updated_at = NOW() \
         WHERE id = $1 AND stock >= $2",
    )
    .bind(m.product_id)
    .bind(m.quantity as i32)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if affected == 0 {
        let current: Option<(String, i32)> =
            sqlx::query_as("SELECT sku, stock FROM products WHERE id = $1")
                .bind(m.product_id)
                .fetch_optional(&mut **tx)
                .await?;
        return match current {
            Some((sku, stock)) => Err(CheckoutError::OutOfStock {
                sku: Sku::new(sku).map_err(|e| CheckoutError::Storage(e.to_string()))?,
                requested: m.quantity,
                available: stock.max(0) as u32,
            }),
            None => Err(CheckoutError::ProductNotFound(m.product_id)),
        };
    }
    Ok(())
}

/// Move points and append the matching ledger row. The balance written to
/// `balance_after` is the one the database reports, not the plan's
/// precomputed value.
async fn apply_ledger_entry(
    tx: &mut Transaction<'_, Postgres>,
    entry: &LoyaltyLedgerEntry,
) -> Result<()> {
    let new_balance: Option<(i64,)> =
        sqlx::query_as("UPDATE users SET loyalty_points = loyalty_points + $2 WHERE id = $1 RETURNING loyalty_points")
            .bind(entry.user_id)
            .bind(entry.points)
            .fetch_optional(&mut **tx)
            .await?;
    let (balance_after,) = new_balance.ok_or(CheckoutError::UserNotFound(entry.user_id))?;

    let entry_type = match entry.entry_type {
        LedgerEntryType::Earned => "earned",
        LedgerEntryType::Redeemed => "redeemed",
        LedgerEntryType::Expired => "expired",
        LedgerEntryType::Adjusted => "adjusted",
    };
    sqlx::query(
        "INSERT INTO loyalty_transactions (id, user_id, entry_type, points, description, order_id, balance_after, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(entry.id)
    .bind(entry.user_id)
    .bind(entry_type)
    .bind(entry.points)
    .bind(&entry.description)
    .bind(entry.order_id)
    .bind(balance_after)
    .bind(entry.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn update_order_row(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
    let history = serde_json::to_value(order.status_history())
        .map_err(|e| CheckoutError::Storage(e.to_string()))?;
    let affected = sqlx::query(
        "UPDATE orders SET status = $2, cancel_reason = $3, delivered_at = $4, status_history = $5, updated_at = $6 \
         WHERE id = $1",
    )
    .bind(order.id())
    .bind(order.status().to_string())
    .bind(order.cancel_reason())
    .bind(order.delivered_at())
    .bind(history)
    .bind(order.updated_at())
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(CheckoutError::OrderNotFound(order.id()));
    }
    Ok(())
}

impl CatalogLookup for PgStore {
    async fn product(&self, id: Uuid) -> Result<Option<ProductSnapshot>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, sku, name, price, stock, category_id, image_url, status FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(ProductRow::into_snapshot).transpose()
    }
}

impl CouponLookup for PgStore {
    async fn coupon(&self, code: &str) -> Result<Option<CouponSnapshot>> {
        let row = sqlx::query_as::<_, CouponRow>(
            "SELECT code, discount_type, discount_value, min_purchase, max_discount, starts_at, expires_at, \
             usage_limit, usage_count, is_active, applicable_products, applicable_categories \
             FROM coupons WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CouponRow::into_snapshot).transpose()
    }

    async fn increment_usage(&self, code: &str) -> Result<()> {
        let affected = sqlx::query("UPDATE coupons SET usage_count = usage_count + 1 WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(CheckoutError::CouponNotFound(code.to_string()));
        }
        Ok(())
    }
}

impl LoyaltyStore for PgStore {
    async fn balance(&self, user_id: Uuid) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT loyalty_points FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(points,)| points).ok_or(CheckoutError::UserNotFound(user_id))
    }

    async fn adjust_balance(&self, user_id: Uuid, delta: i64) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("UPDATE users SET loyalty_points = loyalty_points + $2 WHERE id = $1 RETURNING loyalty_points")
                .bind(user_id)
                .bind(delta)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(points,)| points).ok_or(CheckoutError::UserNotFound(user_id))
    }
}

impl LedgerWriter for PgStore {
    async fn append_entry(&self, entry: &LoyaltyLedgerEntry) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        apply_ledger_entry(&mut tx, entry).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl OrderWriter for PgStore {
    async fn create_order(&self, order: &Order) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        insert_order(&mut tx, order).await?;
        tx.commit().await?;
        Ok(order.id())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT product_id, sku, name, image_url, variant, quantity, unit_price, line_total \
             FROM order_items WHERE order_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        order_from_rows(row, items).map(Some)
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_order_row(&mut tx, order).await?;
        tx.commit().await?;
        Ok(())
    }
}

impl SettlementStore for PgStore {
    async fn apply(&self, plan: &SettlementPlan) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;

        insert_order(&mut tx, &plan.order).await?;
        for m in &plan.stock {
            decrement_stock(&mut tx, m).await?;
        }
        for entry in &plan.ledger {
            apply_ledger_entry(&mut tx, entry).await?;
        }
        if let Some(code) = &plan.coupon_code {
            let affected = sqlx::query("UPDATE coupons SET usage_count = usage_count + 1 WHERE code = $1")
                .bind(code)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            if affected == 0 {
                return Err(CheckoutError::CouponNotFound(code.clone()));
            }
        }

        tx.commit().await?;
        Ok(plan.order.id())
    }

    async fn apply_restoration(&self, plan: &RestorationPlan, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for m in &plan.stock {
            let affected = sqlx::query(
                "UPDATE products SET stock = stock + $2, total_sales = total_sales - $2, updated_at = NOW() \
                 WHERE id = $1",
            )
            .bind(m.product_id)
            .bind(m.quantity as i32)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if affected == 0 {
                return Err(CheckoutError::ProductNotFound(m.product_id));
            }
        }
        for entry in &plan.ledger {
            apply_ledger_entry(&mut tx, entry).await?;
        }
        update_order_row(&mut tx, order).await?;

        tx.commit().await?;
        Ok(())
    }
}
