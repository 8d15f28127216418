use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use common::{AccountId, MerchantId, Money, OrderId, ProductId};
use serde::Serialize;

use super::LOW_STOCK_THRESHOLD;
use crate::query::Sortable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Merchant {
    pub id: MerchantId,
    pub name: String,
    pub owner: AccountId,
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    pub fn new(name: impl Into<String>, owner: AccountId) -> Self {
        Self {
            id: MerchantId::new(),
            name: name.into(),
            owner,
            created_at: Utc::now(),
        }
    }
}

impl Sortable for Merchant {
    fn compare_by(&self, other: &Self, field: &str) -> Option<Ordering> {
        match field {
            "created_at" | "updated_at" => Some(self.created_at.cmp(&other.created_at)),
            "name" => Some(self.name.cmp(&other.name)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(merchant_id: MerchantId, name: impl Into<String>, price: Money, quantity: u32) -> Self {
        Self {
            id: ProductId::new(),
            merchant_id,
            name: name.into(),
            price,
            quantity,
            created_at: Utc::now(),
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity <= LOW_STOCK_THRESHOLD
    }
}

impl Sortable for Product {
    fn compare_by(&self, other: &Self, field: &str) -> Option<Ordering> {
        match field {
            "created_at" | "updated_at" => Some(self.created_at.cmp(&other.created_at)),
            "name" => Some(self.name.cmp(&other.name)),
            "price" => Some(self.price.cmp(&other.price)),
            "quantity" => Some(self.quantity.cmp(&other.quantity)),
            _ => None,
        }
    }
}

/// Stock withheld for an order until its payment settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservedProduct {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Price times quantity at reservation time.
    pub payable: Money,
}

/// Why stock could not be held for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ProductNotFound,
    OutOfStock { available: u32, requested: u32 },
    /// Price times quantity does not fit in the money range.
    PayableOverflow,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::ProductNotFound => write!(f, "product not found"),
            RejectReason::OutOfStock {
                available,
                requested,
            } => write!(f, "out of stock: {available} available, {requested} requested"),
            RejectReason::PayableOverflow => write!(f, "order total out of range"),
        }
    }
}

/// Outcome of asking for a hold.
///
/// Asking again for the same order returns the first outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reservation {
    Reserved(ReservedProduct),
    Rejected(RejectReason),
    /// The hold already existed and has been consumed or returned.
    Settled,
}
