//! Shared identifiers and value objects used by every service in the
//! order saga.

mod auth;
mod money;
mod service;
mod types;

pub use auth::{Claims, ParseRoleError, Role, action, resource};
pub use money::Money;
pub use service::{ParseServiceError, Service};
pub use types::{
    AccountId, CorrelationId, MerchantId, OrderId, ParseIdError, ProductId, TransactionId,
};
