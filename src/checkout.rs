//! Checkout orchestration.
//!
//! One request, one quote, one settlement. The service resolves every
//! lookup through the store ports, prices the cart, and hands the
//! resulting plan to the store to commit atomically. Failures come back
//! as typed errors for the host API layer to render; nothing is retried
//! here.

use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::config::CheckoutConfig;
use crate::domain::aggregates::order::{Order, OrderStatus};
use crate::domain::catalog::ProductSnapshot;
use crate::domain::coupon::CouponSnapshot;
use crate::error::{CheckoutError, Result};
use crate::ports::SettlementStore;
use crate::pricing::{CartLine, OrderQuote, PricingEngine};
use crate::settlement::{restoration_for, settle};

/// A checkout request, validated before it reaches the pricing engine.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub items: Vec<CartLine>,
    pub coupon_code: Option<String>,
    /// Caller opts in to spending available loyalty points.
    #[serde(default)]
    pub redeem_points: bool,
}

/// What a successful checkout hands back to the host.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order_id: Uuid,
    pub order_number: String,
    pub quote: OrderQuote,
}

pub struct CheckoutService<S> {
    store: S,
    engine: PricingEngine,
    currency: String,
}

impl<S: SettlementStore> CheckoutService<S> {
    pub fn new(store: S, config: CheckoutConfig) -> Self {
        Self { store, engine: PricingEngine::new(config.policy), currency: config.currency }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Price a cart without committing anything. Backs cart pages and
    /// coupon validation UI.
    pub async fn preview(&self, request: &CheckoutRequest) -> Result<OrderQuote> {
        request.validate()?;
        let (items, coupon, balance) = self.resolve(request).await?;
        self.engine.quote(&items, coupon.as_ref(), balance, request.redeem_points, Utc::now())
    }

    /// Price the cart and settle it: create the order, decrement stock,
    /// move loyalty points, and consume the coupon, all or nothing.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome> {
        request.validate()?;
        let (items, coupon, balance) = self.resolve(&request).await?;
        let quote =
            self.engine.quote(&items, coupon.as_ref(), balance, request.redeem_points, Utc::now())?;
        let plan = settle(&quote, request.user_id, balance, request.coupon_code.clone(), &self.currency);
        let order_number = plan.order.order_number().to_string();
        let order_id = self.store.apply(&plan).await?;
        info!(
            %order_id,
            %order_number,
            user_id = %request.user_id,
            total = %quote.total,
            points_used = quote.loyalty_points_used,
            points_earned = quote.loyalty_points_earned,
            "order settled"
        );
        Ok(CheckoutOutcome { order_id, order_number, quote })
    }

    /// Cancel an order that has not started fulfilment: restore stock and
    /// persist the status change. Loyalty reversal follows policy.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
        updated_by: Uuid,
    ) -> Result<Order> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        let balance = self.store.balance(order.user_id()).await?;
        let plan = restoration_for(&order, balance, self.engine.policy())?;
        order.cancel(reason, updated_by)?;
        self.store.apply_restoration(&plan, &order).await?;
        info!(%order_id, order_number = %order.order_number(), "order cancelled, stock restored");
        Ok(order)
    }

    /// Staff status update. Cancellation is routed through `cancel_order`
    /// so stock restoration can never be skipped.
    pub async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        note: Option<String>,
        updated_by: Uuid,
    ) -> Result<Order> {
        if status == OrderStatus::Cancelled {
            return self.cancel_order(order_id, note, updated_by).await;
        }
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;
        order.update_status(status, note, updated_by)?;
        self.store.update_order(&order).await?;
        info!(%order_id, status = %status, "order status updated");
        Ok(order)
    }

    async fn resolve(
        &self,
        request: &CheckoutRequest,
    ) -> Result<(Vec<(CartLine, ProductSnapshot)>, Option<CouponSnapshot>, i64)> {
        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let product = self
                .store
                .product(line.product_id)
                .await?
                .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
            items.push((line.clone(), product));
        }
        let coupon = match request.coupon_code.as_deref() {
            Some(code) => Some(
                self.store
                    .coupon(code)
                    .await?
                    .ok_or_else(|| CheckoutError::CouponNotFound(code.to_string()))?,
            ),
            None => None,
        };
        let balance = self.store.balance(request.user_id).await?;
        Ok((items, coupon, balance))
    }
}
