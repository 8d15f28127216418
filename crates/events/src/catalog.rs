//! The closed set of event payloads exchanged by the services.
//!
//! Every payload travels as the bare JSON object inside the envelope's
//! `payload` field; the envelope's `meta.name` says which variant it is.

use common::{AccountId, Money, OrderId, ProductId, Role};
use serde::{Deserialize, Serialize};

use crate::error::{EventError, Result};

/// Logical event names.
pub mod names {
    pub const ACCOUNT_CREATED: &str = "EventAccountCreated";
    pub const ACCOUNT_DELETED: &str = "EventAccountDeleted";
    pub const UPSERT_POLICY: &str = "EventUpsertPolicy";
    pub const REMOVE_POLICY: &str = "EventRemovePolicy";
    pub const POLICY_UPDATED: &str = "EventPolicyUpdated";
    pub const ORDER_CREATED: &str = "EventOrderCreated";
    pub const PRODUCT_RESERVED: &str = "EventProductReserved";
    pub const ERR_RESERVING_PRODUCT: &str = "EventErrReservingProduct";
    pub const PAYMENT: &str = "EventPayment";

    /// Every name in the catalog together with its subject template.
    pub const SUBJECTS: [(&str, &str); 9] = [
        (ACCOUNT_CREATED, "identitysvc.EventAccountCreated"),
        (ACCOUNT_DELETED, "identitysvc.EventAccountDeleted"),
        (UPSERT_POLICY, "authzsvc.EventUpsertPolicy"),
        (REMOVE_POLICY, "authzsvc.EventRemovePolicy"),
        (POLICY_UPDATED, "authzsvc.EventPolicyUpdated"),
        (ORDER_CREATED, "ordersvc.EventOrderCreated"),
        (PRODUCT_RESERVED, "inventorysvc.EventProductReserved"),
        (ERR_RESERVING_PRODUCT, "inventorysvc.EventErrReservingProduct"),
        (PAYMENT, "paymentsvc.EventPayment"),
    ];
}

/// A new account was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreated {
    pub accnt_id: AccountId,
    pub role: Role,
}

/// An account was removed; its grants must go with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDeleted {
    pub accnt_id: AccountId,
}

/// One grant tuple as carried by the policy events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyTarget {
    pub subject: String,
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
}

impl PolicyTarget {
    pub fn new(
        subject: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            action: action.into(),
        }
    }
}

/// Whether a grant was added or removed at the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMethod {
    Put,
    Delete,
}

impl PolicyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMethod::Put => "put",
            PolicyMethod::Delete => "delete",
        }
    }
}

impl std::fmt::Display for PolicyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast by the authorization service after it changed a grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUpdated {
    pub method: PolicyMethod,
    #[serde(flatten)]
    pub target: PolicyTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_status: String,
    pub account_id: AccountId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Stock is held for the order; the buyer owes `payable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReserved {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub payable: Money,
}

/// Stock could not be held for the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFailed {
    pub order_id: OrderId,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    PaymentSuccessful,
    PaymentFailed,
}

/// Outcome of charging the buyer's wallet for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub status: PaymentStatus,
}

/// Closed union over every payload in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    AccountCreated(AccountCreated),
    AccountDeleted(AccountDeleted),
    UpsertPolicy(PolicyTarget),
    RemovePolicy(PolicyTarget),
    PolicyUpdated(PolicyUpdated),
    OrderCreated(OrderCreated),
    ProductReserved(ProductReserved),
    ReservationFailed(ReservationFailed),
    Payment(PaymentProcessed),
}

impl EventPayload {
    /// Decodes the JSON payload of the event called `name`.
    pub fn decode(name: &str, value: serde_json::Value) -> Result<Self> {
        let payload = match name {
            names::ACCOUNT_CREATED => Self::AccountCreated(serde_json::from_value(value)?),
            names::ACCOUNT_DELETED => Self::AccountDeleted(serde_json::from_value(value)?),
            names::UPSERT_POLICY => Self::UpsertPolicy(serde_json::from_value(value)?),
            names::REMOVE_POLICY => Self::RemovePolicy(serde_json::from_value(value)?),
            names::POLICY_UPDATED => Self::PolicyUpdated(serde_json::from_value(value)?),
            names::ORDER_CREATED => Self::OrderCreated(serde_json::from_value(value)?),
            names::PRODUCT_RESERVED => Self::ProductReserved(serde_json::from_value(value)?),
            names::ERR_RESERVING_PRODUCT => {
                Self::ReservationFailed(serde_json::from_value(value)?)
            }
            names::PAYMENT => Self::Payment(serde_json::from_value(value)?),
            other => return Err(EventError::UnregisteredEvent(other.to_string())),
        };
        Ok(payload)
    }
}

impl From<AccountCreated> for EventPayload {
    fn from(payload: AccountCreated) -> Self {
        Self::AccountCreated(payload)
    }
}

impl From<AccountDeleted> for EventPayload {
    fn from(payload: AccountDeleted) -> Self {
        Self::AccountDeleted(payload)
    }
}

impl From<PolicyUpdated> for EventPayload {
    fn from(payload: PolicyUpdated) -> Self {
        Self::PolicyUpdated(payload)
    }
}

impl From<OrderCreated> for EventPayload {
    fn from(payload: OrderCreated) -> Self {
        Self::OrderCreated(payload)
    }
}

impl From<ProductReserved> for EventPayload {
    fn from(payload: ProductReserved) -> Self {
        Self::ProductReserved(payload)
    }
}

impl From<ReservationFailed> for EventPayload {
    fn from(payload: ReservationFailed) -> Self {
        Self::ReservationFailed(payload)
    }
}

impl From<PaymentProcessed> for EventPayload {
    fn from(payload: PaymentProcessed) -> Self {
        Self::Payment(payload)
    }
}
