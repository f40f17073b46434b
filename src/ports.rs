//! External collaborator interfaces.
//!
//! The engine stays pure; everything it must read or write crosses one of
//! these traits. `SettlementStore` is the transactional boundary: a plan
//! goes in whole and is applied whole, or the store reports a typed
//! failure and nothing is committed.

use uuid::Uuid;

use crate::domain::aggregates::order::Order;
use crate::domain::catalog::ProductSnapshot;
use crate::domain::coupon::CouponSnapshot;
use crate::domain::loyalty::LoyaltyLedgerEntry;
use crate::error::Result;
use crate::settlement::{RestorationPlan, SettlementPlan};

/// Catalog reads. Snapshots must reflect stock at call time.
pub trait CatalogLookup {
    fn product(&self, id: Uuid) -> impl std::future::Future<Output = Result<Option<ProductSnapshot>>> + Send;
}

/// Coupon reads and the post-settlement usage bump.
pub trait CouponLookup {
    fn coupon(&self, code: &str) -> impl std::future::Future<Output = Result<Option<CouponSnapshot>>> + Send;
    fn increment_usage(&self, code: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// The user's loyalty point balance.
pub trait LoyaltyStore {
    fn balance(&self, user_id: Uuid) -> impl std::future::Future<Output = Result<i64>> + Send;
    /// Returns the new balance; appliers use it for `balance_after`.
    fn adjust_balance(&self, user_id: Uuid, delta: i64) -> impl std::future::Future<Output = Result<i64>> + Send;
}

/// Append-only ledger writes.
pub trait LedgerWriter {
    fn append_entry(&self, entry: &LoyaltyLedgerEntry) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Order persistence.
pub trait OrderWriter {
    fn create_order(&self, order: &Order) -> impl std::future::Future<Output = Result<Uuid>> + Send;
    fn order(&self, id: Uuid) -> impl std::future::Future<Output = Result<Option<Order>>> + Send;
    fn update_order(&self, order: &Order) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// A store that can commit whole plans atomically.
pub trait SettlementStore:
    CatalogLookup + CouponLookup + LoyaltyStore + LedgerWriter + OrderWriter
{
    /// Apply every mutation in the plan as one unit and return the new
    /// order id. Stock decrements are conditional: a concurrent checkout
    /// that emptied the shelf first surfaces as `OutOfStock`, never as a
    /// negative stock level.
    fn apply(&self, plan: &SettlementPlan) -> impl std::future::Future<Output = Result<Uuid>> + Send;

    /// Apply a cancellation: restore stock, write any compensating ledger
    /// entries, and persist the order's new status, as one unit.
    fn apply_restoration(
        &self,
        plan: &RestorationPlan,
        order: &Order,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}
