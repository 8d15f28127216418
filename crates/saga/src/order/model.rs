use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use common::{AccountId, OrderId, ProductId};
use serde::Serialize;

use super::status::OrderStatus;
use crate::query::Sortable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(account_id: AccountId, product_id: ProductId, quantity: u32) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            account_id,
            product_id,
            quantity,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Sortable for Order {
    fn compare_by(&self, other: &Self, field: &str) -> Option<Ordering> {
        match field {
            "created_at" => Some(self.created_at.cmp(&other.created_at)),
            "updated_at" => Some(self.updated_at.cmp(&other.updated_at)),
            "quantity" => Some(self.quantity.cmp(&other.quantity)),
            _ => None,
        }
    }
}

/// Result of a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied { from: OrderStatus, to: OrderStatus },
    /// The order is already at or past the requested status.
    Ignored { current: OrderStatus },
}
