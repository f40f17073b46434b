//! Order Aggregate
//!
//! An order is created from a priced quote and then walks a fixed status
//! state machine. Every transition appends to an immutable status history;
//! entries are never edited or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{Money, Sku};
use crate::error::CheckoutError;
use crate::pricing::OrderQuote;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

impl OrderStatus {
    /// The order lifecycle: pending -> confirmed -> processing -> shipped
    /// -> delivered, with cancellation possible before processing starts
    /// and returns only after delivery.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Delivered, Returned)
        )
    }

    /// No stock mutation may follow a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Returned)
    }

    pub fn can_cancel(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "returned" => Ok(OrderStatus::Returned),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// One priced cart line, snapshotted onto the order at creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub sku: Sku,
    pub image_url: Option<String>,
    pub variant: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Append-only status audit record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    pub note: Option<String>,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    status: OrderStatus,
    items: Vec<LineItem>,
    subtotal: Money,
    discount: Money,
    shipping_cost: Money,
    tax: Money,
    total: Money,
    loyalty_points_used: i64,
    loyalty_points_earned: i64,
    coupon_code: Option<String>,
    currency: String,
    cancel_reason: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    status_history: Vec<StatusChange>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

impl Order {
    /// Create a pending order from a computed quote, 1:1.
    pub fn place(user_id: Uuid, quote: &OrderQuote, coupon_code: Option<String>, currency: &str) -> Self {
        let id = Uuid::new_v4();
        let order_number = format!("ORD-{:08}", rand::random::<u32>());
        let now = Utc::now();
        let mut order = Self {
            id,
            order_number,
            user_id,
            status: OrderStatus::Pending,
            items: quote.lines.clone(),
            subtotal: quote.subtotal,
            discount: quote.discount,
            shipping_cost: quote.shipping_cost,
            tax: quote.tax,
            total: quote.total,
            loyalty_points_used: quote.loyalty_points_used,
            loyalty_points_earned: quote.loyalty_points_earned,
            coupon_code,
            currency: currency.to_string(),
            cancel_reason: None,
            delivered_at: None,
            status_history: vec![StatusChange {
                status: OrderStatus::Pending,
                note: None,
                updated_by: user_id,
                updated_at: now,
            }],
            created_at: now,
            updated_at: now,
            events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: id, user_id, total: quote.total });
        order
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn discount(&self) -> Money { self.discount }
    pub fn shipping_cost(&self) -> Money { self.shipping_cost }
    pub fn tax(&self) -> Money { self.tax }
    pub fn total(&self) -> Money { self.total }
    pub fn loyalty_points_used(&self) -> i64 { self.loyalty_points_used }
    pub fn loyalty_points_earned(&self) -> i64 { self.loyalty_points_earned }
    pub fn coupon_code(&self) -> Option<&str> { self.coupon_code.as_deref() }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn cancel_reason(&self) -> Option<&str> { self.cancel_reason.as_deref() }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn status_history(&self) -> &[StatusChange] { &self.status_history }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Staff-driven status update. Guards the transition table, stamps the
    /// delivery timestamp, and appends to the status history.
    pub fn update_status(
        &mut self,
        next: OrderStatus,
        note: Option<String>,
        updated_by: Uuid,
    ) -> Result<(), CheckoutError> {
        if !self.status.can_transition_to(next) {
            return Err(CheckoutError::InvalidStatusTransition { from: self.status, to: next });
        }
        let from = self.status;
        let now = Utc::now();
        self.status = next;
        if next == OrderStatus::Delivered {
            self.delivered_at = Some(now);
        }
        self.status_history.push(StatusChange { status: next, note, updated_by, updated_at: now });
        self.updated_at = now;
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id, from, to: next });
        Ok(())
    }

    /// Cancellation is only allowed before fulfilment starts.
    pub fn cancel(&mut self, reason: Option<String>, updated_by: Uuid) -> Result<(), CheckoutError> {
        if !self.status.can_cancel() {
            return Err(CheckoutError::CannotCancel(self.status));
        }
        self.cancel_reason = reason.clone();
        self.update_status(OrderStatus::Cancelled, reason, updated_by)?;
        self.raise_event(OrderEvent::Cancelled { order_id: self.id });
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }

    /// Rebuild an order from persisted state. Storage adapters only.
    pub(crate) fn from_stored(stored: StoredOrder) -> Self {
        Self {
            id: stored.id,
            order_number: stored.order_number,
            user_id: stored.user_id,
            status: stored.status,
            items: stored.items,
            subtotal: stored.subtotal,
            discount: stored.discount,
            shipping_cost: stored.shipping_cost,
            tax: stored.tax,
            total: stored.total,
            loyalty_points_used: stored.loyalty_points_used,
            loyalty_points_earned: stored.loyalty_points_earned,
            coupon_code: stored.coupon_code,
            currency: stored.currency,
            cancel_reason: stored.cancel_reason,
            delivered_at: stored.delivered_at,
            status_history: stored.status_history,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
            events: vec![],
        }
    }
}

/// Raw persisted order state, as storage adapters read it back.
#[derive(Clone, Debug)]
pub(crate) struct StoredOrder {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
    pub loyalty_points_used: i64,
    pub loyalty_points_earned: i64,
    pub coupon_code: Option<String>,
    pub currency: String,
    pub cancel_reason: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::OrderQuote;

    fn quote() -> OrderQuote {
        OrderQuote {
            lines: vec![LineItem {
                product_id: Uuid::new_v4(),
                name: "Widget".into(),
                sku: Sku::new("W-001").unwrap(),
                image_url: None,
                variant: None,
                quantity: 2,
                unit_price: Money::from_units(10),
                line_total: Money::from_units(20),
            }],
            subtotal: Money::from_units(20),
            discount: Money::ZERO,
            loyalty_points_used: 0,
            loyalty_points_earned: 0,
            shipping_cost: Money::from_units(50),
            tax: Money::from_units(1),
            total: Money::from_units(71),
        }
    }

    #[test]
    fn test_full_lifecycle_stamps_delivery_and_history() {
        let staff = Uuid::new_v4();
        let mut order = Order::place(Uuid::new_v4(), &quote(), None, "INR");
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.status_history().len(), 1);

        order.update_status(OrderStatus::Confirmed, None, staff).unwrap();
        order.update_status(OrderStatus::Processing, None, staff).unwrap();
        order.update_status(OrderStatus::Shipped, Some("dispatched".into()), staff).unwrap();
        order.update_status(OrderStatus::Delivered, None, staff).unwrap();

        assert!(order.delivered_at().is_some());
        assert_eq!(order.status_history().len(), 5);
        assert_eq!(order.status_history()[3].note.as_deref(), Some("dispatched"));
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let staff = Uuid::new_v4();
        let mut order = Order::place(Uuid::new_v4(), &quote(), None, "INR");
        let err = order.update_status(OrderStatus::Shipped, None, staff).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidStatusTransition { .. }));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_cancel_only_before_processing() {
        let staff = Uuid::new_v4();
        let mut order = Order::place(Uuid::new_v4(), &quote(), None, "INR");
        order.update_status(OrderStatus::Confirmed, None, staff).unwrap();
        order.cancel(Some("changed my mind".into()), staff).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancel_reason(), Some("changed my mind"));

        let mut shipped = Order::place(Uuid::new_v4(), &quote(), None, "INR");
        shipped.update_status(OrderStatus::Confirmed, None, staff).unwrap();
        shipped.update_status(OrderStatus::Processing, None, staff).unwrap();
        shipped.update_status(OrderStatus::Shipped, None, staff).unwrap();
        assert!(matches!(shipped.cancel(None, staff), Err(CheckoutError::CannotCancel(OrderStatus::Shipped))));
    }

    #[test]
    fn test_returned_only_after_delivery() {
        let staff = Uuid::new_v4();
        let mut order = Order::place(Uuid::new_v4(), &quote(), None, "INR");
        assert!(order.update_status(OrderStatus::Returned, None, staff).is_err());

        for next in [OrderStatus::Confirmed, OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            order.update_status(next, None, staff).unwrap();
        }
        order.update_status(OrderStatus::Returned, Some("damaged in transit".into()), staff).unwrap();
        assert!(order.status().is_terminal());
    }

    #[test]
    fn test_placement_raises_event() {
        let mut order = Order::place(Uuid::new_v4(), &quote(), None, "INR");
        let events = order.take_events();
        assert!(matches!(events.as_slice(), [OrderEvent::Placed { .. }]));
        assert!(order.take_events().is_empty());
    }
}
