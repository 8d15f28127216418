use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::EventPayload;
use crate::error::Result;

/// Envelope format version stamped on every event.
pub const EVENT_VERSION: &str = "1.0";

/// Envelope metadata. Serialized field names are part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub version: String,
    /// Name of the producing service.
    pub source: String,
    pub time: DateTime<Utc>,
    /// Logical event name, the registry key.
    pub name: String,
    /// Globally unique event identifier.
    pub id: Uuid,
    /// Correlation ID of the request that caused this event.
    pub req_id: CorrelationId,
}

impl EventMeta {
    /// Builds fresh metadata for an event created now.
    pub fn new(source: &str, name: &str, correlation_id: &CorrelationId) -> Self {
        Self {
            version: EVENT_VERSION.to_string(),
            source: source.to_string(),
            time: Utc::now(),
            name: name.to_string(),
            id: Uuid::new_v4(),
            req_id: correlation_id.clone(),
        }
    }
}

/// A validated domain event ready to be published.
///
/// Only [`EventRegistry::create`](crate::EventRegistry::create) builds these,
/// so every `Event` has a registered name and a payload its validator accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub meta: EventMeta,
    pub payload: EventPayload,
}

impl Event {
    pub(crate) fn new(meta: EventMeta, payload: EventPayload) -> Self {
        Self { meta, payload }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.meta.req_id
    }

    /// Encodes the event as its JSON wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An event as read off the wire, before the payload has been decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub meta: EventMeta,
    pub payload: serde_json::Value,
}

impl RawEvent {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decodes the payload according to `meta.name`.
    pub fn decode(self) -> Result<Event> {
        let payload = EventPayload::decode(&self.meta.name, self.payload)?;
        Ok(Event::new(self.meta, payload))
    }
}
