//! Order participant: accepts purchases and follows them through the saga.

mod model;
mod repository;
mod service;
mod status;

pub use model::{Order, StatusChange};
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use service::{OrderEvent, OrderService};
pub use status::OrderStatus;
