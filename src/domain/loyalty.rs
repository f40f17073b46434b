//! Loyalty ledger.
//!
//! The ledger is append-only: one immutable entry per balance change,
//! with `balance_after` recording the running balance so the history can
//! be reconstructed without replaying every order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    Earned,
    Redeemed,
    Expired,
    Adjusted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoyaltyLedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entry_type: LedgerEntryType,
    /// Signed: negative for redemptions, positive for awards.
    pub points: i64,
    pub description: String,
    pub order_id: Option<Uuid>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl LoyaltyLedgerEntry {
    fn new(
        user_id: Uuid,
        entry_type: LedgerEntryType,
        points: i64,
        description: String,
        order_id: Option<Uuid>,
        balance_after: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            entry_type,
            points,
            description,
            order_id,
            balance_after,
            created_at: Utc::now(),
        }
    }

    pub fn redeemed(user_id: Uuid, points: i64, order_id: Uuid, order_number: &str, balance_after: i64) -> Self {
        Self::new(
            user_id,
            LedgerEntryType::Redeemed,
            -points,
            format!("Redeemed for order {order_number}"),
            Some(order_id),
            balance_after,
        )
    }

    pub fn earned(user_id: Uuid, points: i64, order_id: Uuid, order_number: &str, balance_after: i64) -> Self {
        Self::new(
            user_id,
            LedgerEntryType::Earned,
            points,
            format!("Earned from order {order_number}"),
            Some(order_id),
            balance_after,
        )
    }

    pub fn adjusted(user_id: Uuid, points: i64, order_id: Uuid, description: String, balance_after: i64) -> Self {
        Self::new(user_id, LedgerEntryType::Adjusted, points, description, Some(order_id), balance_after)
    }
}
