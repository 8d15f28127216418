pub mod accounts;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod policies;
