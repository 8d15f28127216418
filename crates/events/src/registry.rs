//! Explicit registry of the events a process may create, publish or consume.

use std::collections::HashMap;

use common::CorrelationId;

use crate::bus::EventBus;
use crate::catalog::{EventPayload, names};
use crate::envelope::{Event, EventMeta};
use crate::error::{EventError, Result};

/// Decides whether a payload may be emitted under a given event name.
pub type PayloadValidator = fn(&EventPayload) -> bool;

#[derive(Debug, Clone)]
struct Entry {
    subject: Option<String>,
    validator: PayloadValidator,
}

/// Maps logical event names to their subject template and payload validator.
///
/// Built once during bootstrap and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    entries: HashMap<String, Entry>,
}

impl EventRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every event of the catalog.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (name, subject) in names::SUBJECTS {
            registry.register(name, Some(subject), catalog_validator(name));
        }
        registry
    }

    /// Registers an event. A second registration under the same name replaces
    /// the first.
    pub fn register(&mut self, name: &str, subject: Option<&str>, validator: PayloadValidator) {
        self.entries.insert(
            name.to_string(),
            Entry {
                subject: subject.map(str::to_string),
                validator,
            },
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the subject template the event is published on.
    pub fn subject(&self, name: &str) -> Result<&str> {
        let entry = self.entry(name)?;
        entry
            .subject
            .as_deref()
            .ok_or_else(|| EventError::SubjectNotConfigured(name.to_string()))
    }

    /// Returns the subject a given consumer reads the event from.
    pub fn consumer_subject(&self, name: &str, consumer: &str) -> Result<String> {
        Ok(format!("{}.{}", self.subject(name)?, consumer))
    }

    /// Builds a new event after checking the name and the payload.
    pub fn create(
        &self,
        source: &str,
        correlation_id: &CorrelationId,
        name: &str,
        payload: EventPayload,
    ) -> Result<Event> {
        let entry = self.entry(name)?;
        if !(entry.validator)(&payload) {
            return Err(EventError::InvalidPayload(name.to_string()));
        }
        Ok(Event::new(
            EventMeta::new(source, name, correlation_id),
            payload,
        ))
    }

    /// Sends one event to its subject.
    #[tracing::instrument(skip(self, bus, event), fields(event_name = %event.name(), event_id = %event.meta.id))]
    pub async fn publish(&self, bus: Option<&dyn EventBus>, event: &Event) -> Result<()> {
        let bus = bus.ok_or(EventError::NoConnection)?;
        let subject = self.subject(event.name())?;
        let bytes = event.to_bytes()?;

        match bus.publish(subject, bytes).await {
            Ok(()) => {
                metrics::counter!("events_published_total", "event" => event.name().to_string())
                    .increment(1);
                tracing::debug!(subject, "event published");
                Ok(())
            }
            Err(e) => {
                metrics::counter!("events_publish_failed_total", "event" => event.name().to_string())
                    .increment(1);
                Err(e.into())
            }
        }
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        self.entries
            .get(name)
            .ok_or_else(|| EventError::UnregisteredEvent(name.to_string()))
    }
}

fn catalog_validator(name: &str) -> PayloadValidator {
    match name {
        names::ACCOUNT_CREATED => |p| matches!(p, EventPayload::AccountCreated(_)),
        names::ACCOUNT_DELETED => |p| matches!(p, EventPayload::AccountDeleted(_)),
        names::UPSERT_POLICY => |p| matches!(p, EventPayload::UpsertPolicy(_)),
        names::REMOVE_POLICY => |p| matches!(p, EventPayload::RemovePolicy(_)),
        names::POLICY_UPDATED => |p| matches!(p, EventPayload::PolicyUpdated(_)),
        names::ORDER_CREATED => |p| matches!(p, EventPayload::OrderCreated(_)),
        names::PRODUCT_RESERVED => |p| matches!(p, EventPayload::ProductReserved(_)),
        names::ERR_RESERVING_PRODUCT => |p| matches!(p, EventPayload::ReservationFailed(_)),
        names::PAYMENT => |p| matches!(p, EventPayload::Payment(_)),
        _ => |_| false,
    }
}
