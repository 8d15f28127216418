use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccountId;

/// Resource type names used in policy grants.
pub mod resource {
    pub const ACCOUNTS: &str = "accounts";
    pub const MERCHANTS: &str = "merchants";
    pub const PRODUCTS: &str = "products";
    pub const ORDERS: &str = "orders";
    pub const TRANSACTIONS: &str = "transactions";
}

/// Action names used in policy grants. `ANY` is the wildcard.
pub mod action {
    pub const GET: &str = "get";
    pub const POST: &str = "post";
    pub const PUT: &str = "put";
    pub const DELETE: &str = "delete";
    pub const ANY: &str = "*";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

/// Role of an account. Decides which default grants a new account receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Seller,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "seller" => Ok(Role::Seller),
            "admin" => Ok(Role::Admin),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// Authenticated caller attached to every client request.
///
/// Verified upstream; the services trust it as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub account_id: AccountId,
    pub email: String,
    pub role: Role,
}

impl Claims {
    pub fn new(account_id: AccountId, email: impl Into<String>, role: Role) -> Self {
        Self {
            account_id,
            email: email.into(),
            role,
        }
    }

    /// Policy subject of the caller.
    pub fn subject(&self) -> String {
        self.account_id.subject()
    }
}
