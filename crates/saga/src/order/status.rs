//! Order status lattice.

use serde::{Deserialize, Serialize};

/// The status of an order.
///
/// ```text
/// Pending ──► PaymentPending ──┬──► Paid
///    │                         └──► Failed
///    └──► ProductOutOfStock
/// ```
///
/// Statuses are ranked and only ever move to a higher rank, so a late or
/// redelivered event cannot move an order backwards. `Pending` may jump
/// straight to `Paid` or `Failed` when the payment outcome arrives before
/// the reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    PaymentPending,
    Paid,
    ProductOutOfStock,
    Canceled,
    Failed,
}

impl OrderStatus {
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::PaymentPending => 1,
            OrderStatus::Paid
            | OrderStatus::ProductOutOfStock
            | OrderStatus::Canceled
            | OrderStatus::Failed => 2,
        }
    }

    /// Returns true if an order may move from this status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.rank() == 2
    }

    /// Returns the status name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::Paid => "paid",
            OrderStatus::ProductOutOfStock => "product_out_of_stock",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
