//! Error taxonomy for the checkout engine.
//!
//! Every failure is surfaced synchronously to the caller as a typed
//! variant; nothing is retried internally and no value is silently
//! defaulted. The host application maps these onto its own API surface.

use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::{Money, Sku};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("invalid quantity for product {0}")]
    InvalidQuantity(Uuid),

    #[error("product {0} not found")]
    ProductNotFound(Uuid),

    #[error("insufficient stock for {sku}: requested {requested}, available {available}")]
    OutOfStock { sku: Sku, requested: u32, available: u32 },

    #[error("coupon {0} not found")]
    CouponNotFound(String),

    #[error("coupon {0} is expired, inactive, or fully used")]
    CouponInvalid(String),

    #[error("coupon {code} requires a minimum purchase of {minimum}")]
    CouponBelowMinimum { code: String, minimum: Money },

    #[error("coupon {0} is not applicable to the items in the cart")]
    CouponNotApplicable(String),

    #[error("order total computed negative: {0}")]
    InvalidTotal(Money),

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error("user {0} not found")]
    UserNotFound(Uuid),

    #[error("order cannot be cancelled while {0}")]
    CannotCancel(OrderStatus),

    #[error("invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        CheckoutError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
