//! Choreographed order saga.
//!
//! Five participants cooperate purely through events:
//! 1. Identity registers accounts and announces them
//! 2. Authorization owns the grants and broadcasts every change
//! 3. Order accepts purchases and tracks their status
//! 4. Inventory holds stock for new orders and releases or returns it
//! 5. Payment charges the buyer's wallet
//!
//! No participant owns the workflow. Each reacts to the events addressed to
//! it, commits locally, then publishes what happened. Business failures
//! with a compensating path are answered with events; infrastructure
//! failures surface as retryable errors so the broker redelivers.

pub mod authz;
pub mod context;
pub mod error;
pub mod identity;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod query;

pub use authz::{AuthzEvent, AuthzService, InMemoryPolicyRepository, PolicyRepository};
pub use context::EventContext;
pub use error::{Result, SagaError};
pub use identity::{
    Account, AccountRepository, IdentityEvent, IdentityService, InMemoryAccountRepository,
    NewAccount,
};
pub use inventory::{
    InMemoryInventoryRepository, InventoryEvent, InventoryRepository, InventoryService, Merchant,
    Product, RejectReason, Reservation, ReservedProduct,
};
pub use order::{
    InMemoryOrderRepository, Order, OrderEvent, OrderRepository, OrderService, OrderStatus,
    StatusChange,
};
pub use payment::{
    Debit, InMemoryPaymentRepository, PaymentEvent, PaymentRepository, PaymentService,
    Transaction, Wallet,
};
pub use query::{QueryParams, Sortable};
