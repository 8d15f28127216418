//! Consumer runtime: subscribes a handler to its events, decodes each
//! delivery and settles it with an ack or a nak.
//!
//! Settlement rules:
//! - malformed envelope, unknown name or undecodable payload: ack and drop
//! - handler success: ack
//! - handler failure classified retryable: nak, the broker redelivers
//! - any other handler failure: ack and drop

use std::sync::Arc;

use async_trait::async_trait;
use common::CorrelationId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::bus::{Delivery, EventBus};
use crate::catalog::EventPayload;
use crate::envelope::RawEvent;
use crate::error::{Result, Retryable};
use crate::registry::EventRegistry;

/// The closed set of events one service consumes.
pub trait InboundEvent: Sized + Send + 'static {
    /// Names of the events this type accepts. One subscription is opened per
    /// name.
    const NAMES: &'static [&'static str];

    /// Narrows a catalog payload to this service's events.
    fn from_payload(payload: EventPayload) -> Option<Self>;
}

/// Business logic invoked for each decoded event.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    type Event: InboundEvent;
    type Error: std::error::Error + Retryable + Send + Sync + 'static;

    async fn handle(
        &self,
        correlation_id: &CorrelationId,
        event: Self::Event,
    ) -> std::result::Result<(), Self::Error>;
}

/// What to do with a delivery after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; acknowledge.
    Ack,
    /// Transient failure; negative-acknowledge so it is redelivered.
    Retry,
    /// Permanent failure; acknowledge so it is never redelivered.
    Drop,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Retry => "retry",
            Disposition::Drop => "drop",
        }
    }
}

/// Decodes one raw message and runs the handler on it.
pub async fn dispatch<H: EventHandler>(handler: &H, payload: &[u8]) -> Disposition {
    let raw = match RawEvent::from_slice(payload) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "dropping malformed message");
            metrics::counter!("events_consumed_total", "event" => "malformed", "outcome" => "drop")
                .increment(1);
            return Disposition::Drop;
        }
    };

    let name = raw.meta.name.clone();
    let span = tracing::info_span!(
        "consume_event",
        event_name = %name,
        event_id = %raw.meta.id,
        correlation_id = %raw.meta.req_id,
    );

    let disposition = decide(handler, raw).instrument(span).await;
    metrics::counter!("events_consumed_total", "event" => name, "outcome" => disposition.as_str())
        .increment(1);
    disposition
}

async fn decide<H: EventHandler>(handler: &H, raw: RawEvent) -> Disposition {
    if !H::Event::NAMES.contains(&raw.meta.name.as_str()) {
        tracing::warn!("dropping event this consumer does not handle");
        return Disposition::Drop;
    }

    let correlation_id = raw.meta.req_id.clone();
    let event = match raw.decode() {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "dropping event with undecodable payload");
            return Disposition::Drop;
        }
    };
    let Some(inbound) = H::Event::from_payload(event.payload) else {
        tracing::warn!("dropping event with unexpected payload variant");
        return Disposition::Drop;
    };

    match handler.handle(&correlation_id, inbound).await {
        Ok(()) => Disposition::Ack,
        Err(e) if e.is_retryable() => {
            tracing::warn!(error = %e, "transient failure, message will be redelivered");
            Disposition::Retry
        }
        Err(e) => {
            tracing::error!(error = %e, "handler failed permanently, dropping message");
            Disposition::Drop
        }
    }
}

async fn settle<H: EventHandler>(handler: &H, delivery: Delivery) {
    let subject = delivery.subject.clone();
    let attempt = delivery.attempt;
    let result = match dispatch(handler, &delivery.payload).await {
        Disposition::Ack | Disposition::Drop => delivery.ack().await,
        Disposition::Retry => delivery.nak().await,
    };
    if let Err(e) = result {
        tracing::error!(subject = %subject, attempt, error = %e, "failed to settle delivery");
    }
}

/// Subscribes a handler to every event it declares.
pub struct Consumer<H: EventHandler> {
    registry: Arc<EventRegistry>,
    bus: Arc<dyn EventBus>,
    name: String,
    handler: Arc<H>,
}

impl<H: EventHandler> Consumer<H> {
    /// `name` is the consuming service; it selects the per-consumer subjects.
    pub fn new(
        registry: Arc<EventRegistry>,
        bus: Arc<dyn EventBus>,
        name: impl Into<String>,
        handler: Arc<H>,
    ) -> Self {
        Self {
            registry,
            bus,
            name: name.into(),
            handler,
        }
    }

    /// Opens the subscriptions and spawns one processing task per subject.
    ///
    /// Deliveries on the same subject are processed one at a time; different
    /// subjects are processed concurrently.
    pub async fn start(self) -> Result<ConsumerHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handle = ConsumerHandle {
            shutdown: shutdown_tx,
            tasks: Vec::new(),
        };

        for name in H::Event::NAMES {
            let subscription = match self.subscribe(name).await {
                Ok(subscription) => subscription,
                Err(e) => {
                    handle.shutdown().await;
                    return Err(e);
                }
            };
            tracing::info!(subject = subscription.subject(), "subscribed");

            let handler = self.handler.clone();
            let mut shutdown = shutdown_rx.clone();
            let mut subscription = subscription;
            handle.tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        delivery = subscription.next() => match delivery {
                            Some(delivery) => settle(handler.as_ref(), delivery).await,
                            None => break,
                        },
                    }
                }
                tracing::info!(subject = subscription.subject(), "unsubscribed");
            }));
        }

        Ok(handle)
    }

    async fn subscribe(&self, name: &str) -> Result<crate::bus::Subscription> {
        let subject = self.registry.subject(name)?;
        Ok(self.bus.subscribe(subject, &self.name).await?)
    }
}

/// Running consumer. Dropping it also stops the processing tasks.
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ConsumerHandle {
    /// Stops every processing task and waits for them to drop their
    /// subscriptions. A delivery being processed is finished first.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "consumer task failed");
            }
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.tasks.len()
    }
}
