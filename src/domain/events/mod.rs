//! Domain events
//!
//! Raised by the order aggregate and drained by the host with
//! `take_events`; dispatch (notifications, webhooks) is the host's job.

use uuid::Uuid;

use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug)]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Money },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: Uuid },
}
