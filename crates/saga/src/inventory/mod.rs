//! Inventory participant: merchants, products and stock holds.
//!
//! Stock for an order moves through a hold:
//! ```text
//! OrderCreated ──► Held ──┬──► Consumed   (payment successful)
//!        │                └──► Returned   (payment failed, quantity restored)
//!        └──► Rejected                    (unknown product or not enough stock)
//! ```

mod model;
mod repository;
mod service;

pub use model::{Merchant, Product, RejectReason, Reservation, ReservedProduct};
pub use repository::{InMemoryInventoryRepository, InventoryRepository};
pub use service::{InventoryEvent, InventoryService};

/// Products at or below this quantity are flagged as low on stock.
pub const LOW_STOCK_THRESHOLD: u32 = 5;
