//! Payment participant: wallets and an append-only ledger.

mod model;
mod repository;
mod service;

pub use model::{Debit, Transaction, Wallet};
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use service::{PaymentEvent, PaymentService};
