//! Event substrate shared by every saga participant.
//!
//! This crate provides:
//! - The JSON event envelope ([`Event`], [`EventMeta`])
//! - The closed catalog of event payloads ([`EventPayload`])
//! - An explicit [`EventRegistry`] mapping event names to subjects and validators
//! - A fail-fast batch [`Publisher`]
//! - The [`EventBus`] transport seam with in-memory and NATS JetStream backends
//! - A [`Consumer`] runtime that decodes, dispatches and acknowledges deliveries

pub mod bus;
pub mod catalog;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod nats;
pub mod publisher;
pub mod registry;

pub use bus::{Acker, Delivery, EventBus, Subscription};
pub use catalog::{
    AccountCreated, AccountDeleted, EventPayload, OrderCreated, PaymentProcessed, PaymentStatus,
    PolicyMethod, PolicyTarget, PolicyUpdated, ProductReserved, ReservationFailed, names,
};
pub use consumer::{Consumer, ConsumerHandle, Disposition, EventHandler, InboundEvent, dispatch};
pub use envelope::{EVENT_VERSION, Event, EventMeta, RawEvent};
pub use error::{BusError, EventError, Result, Retryable};
pub use memory::InMemoryEventBus;
pub use nats::JetStreamBus;
pub use publisher::Publisher;
pub use registry::{EventRegistry, PayloadValidator};
