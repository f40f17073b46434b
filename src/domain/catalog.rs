//! Catalog read model.
//!
//! A `ProductSnapshot` is read fresh from the catalog at order-creation
//! time; cart contents never carry authoritative prices or stock.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Money, Quantity, Sku};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub name: String,
    pub sku: Sku,
    pub unit_price: Money,
    pub stock_available: Quantity,
    pub category_id: Option<Uuid>,
    pub primary_image_url: Option<String>,
    pub is_active: bool,
}

impl ProductSnapshot {
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        quantity <= self.stock_available.value()
    }
}
