//! Transport seam between the event substrate and a concrete broker.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::BusError;

/// Stream of deliveries produced by a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// A message broker with per-consumer, individually acknowledged delivery.
///
/// Publishers send to the event's subject template. Every consumer that
/// subscribed to that template receives its own copy, addressed as
/// `<template>.<consumer>`.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes raw bytes to a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribes `consumer` to everything published on `subject`.
    async fn subscribe(&self, subject: &str, consumer: &str) -> Result<Subscription, BusError>;

    /// Closes the connection. Subscriptions must be dropped before this is
    /// called.
    async fn close(&self) -> Result<(), BusError>;
}

/// Acknowledgement channel for a single delivery.
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(&self) -> Result<(), BusError>;
    async fn nak(&self) -> Result<(), BusError>;
}

/// One message handed to one consumer.
pub struct Delivery {
    pub subject: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(subject: String, payload: Vec<u8>, attempt: u32, acker: Box<dyn Acker>) -> Self {
        Self {
            subject,
            payload,
            attempt,
            acker,
        }
    }

    /// Confirms processing; the message will not be delivered again.
    pub async fn ack(self) -> Result<(), BusError> {
        self.acker.ack().await
    }

    /// Rejects the message so the broker redelivers it.
    pub async fn nak(self) -> Result<(), BusError> {
        self.acker.nak().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("attempt", &self.attempt)
            .field("len", &self.payload.len())
            .finish()
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    subject: String,
    stream: DeliveryStream,
}

impl Subscription {
    pub fn new(subject: impl Into<String>, stream: DeliveryStream) -> Self {
        Self {
            subject: subject.into(),
            stream,
        }
    }

    /// The consumer-specific subject, `<template>.<consumer>`.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Waits for the next delivery. `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.stream.next().await
    }
}
