use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use common::{AccountId, Money, OrderId, TransactionId};
use serde::Serialize;

use crate::query::Sortable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub account_id: AccountId,
    pub balance: Money,
    pub updated_at: DateTime<Utc>,
}

/// A ledger entry. Entries are never modified or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Money,
    pub made_by: AccountId,
    pub is_credit: bool,
    /// Set for debits taken for an order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
}

impl Sortable for Transaction {
    fn compare_by(&self, other: &Self, field: &str) -> Option<Ordering> {
        match field {
            "created_at" | "updated_at" => Some(self.created_at.cmp(&other.created_at)),
            "amount" => Some(self.amount.cmp(&other.amount)),
            _ => None,
        }
    }
}

impl Transaction {
    pub fn credit(made_by: AccountId, amount: Money) -> Self {
        Self {
            id: TransactionId::new(),
            amount,
            made_by,
            is_credit: true,
            order_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn debit(made_by: AccountId, amount: Money, order_id: OrderId) -> Self {
        Self {
            id: TransactionId::new(),
            amount,
            made_by,
            is_credit: false,
            order_id: Some(order_id),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of charging a wallet for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Debit {
    Approved(Transaction),
    InsufficientFunds { balance: Money },
    NoWallet,
    /// The requested charge was zero or negative.
    InvalidAmount { amount: Money },
}

impl Debit {
    pub fn is_approved(&self) -> bool {
        matches!(self, Debit::Approved(_))
    }
}
