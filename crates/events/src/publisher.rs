use std::sync::Arc;

use common::CorrelationId;

use crate::bus::EventBus;
use crate::catalog::EventPayload;
use crate::envelope::Event;
use crate::error::Result;
use crate::registry::EventRegistry;

/// Collects the events produced by one unit of work and publishes them after
/// the local state change has been committed.
#[derive(Debug)]
pub struct Publisher {
    registry: Arc<EventRegistry>,
    source: String,
    correlation_id: CorrelationId,
    events: Vec<Event>,
}

impl Publisher {
    pub fn new(
        registry: Arc<EventRegistry>,
        source: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            registry,
            source: source.into(),
            correlation_id,
            events: Vec::new(),
        }
    }

    /// Creates an event and queues it. On failure nothing is queued and the
    /// events added so far stay in the batch.
    pub fn add(&mut self, name: &str, payload: impl Into<EventPayload>) -> Result<()> {
        match self
            .registry
            .create(&self.source, &self.correlation_id, name, payload.into())
        {
            Ok(event) => {
                self.events.push(event);
                Ok(())
            }
            Err(e) => {
                tracing::error!(event_name = name, error = %e, "failed to add event to batch");
                Err(e)
            }
        }
    }

    /// Publishes the queued events in order, stopping at the first failure.
    ///
    /// Events before the failing one have already been delivered, so the
    /// batch must not be replayed as a whole.
    pub async fn publish_all(&self, bus: Option<&dyn EventBus>) -> Result<()> {
        for (sent, event) in self.events.iter().enumerate() {
            if let Err(e) = self.registry.publish(bus, event).await {
                tracing::error!(
                    event_name = event.name(),
                    correlation_id = %self.correlation_id,
                    sent,
                    remaining = self.events.len() - sent,
                    error = %e,
                    "publishing batch failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(Event::name).collect()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AccountDeleted, PolicyTarget, names};
    use crate::error::EventError;
    use crate::memory::InMemoryEventBus;
    use common::AccountId;

    fn publisher() -> Publisher {
        Publisher::new(
            Arc::new(EventRegistry::standard()),
            "identitysvc",
            CorrelationId::new("r"),
        )
    }

    #[test]
    fn add_keeps_good_events_when_one_fails() {
        let mut publisher = publisher();
        publisher
            .add(names::ACCOUNT_DELETED, AccountDeleted { accnt_id: AccountId::new(1) })
            .unwrap();
        let err = publisher
            .add("UnknownEvent", AccountDeleted { accnt_id: AccountId::new(1) })
            .unwrap_err();
        assert!(matches!(err, EventError::UnregisteredEvent(_)));
        assert_eq!(publisher.event_names(), vec![names::ACCOUNT_DELETED]);
    }

    #[tokio::test]
    async fn publish_all_stops_at_first_failure() {
        let bus = InMemoryEventBus::new();
        bus.fail_publish_on(2).await;

        let mut publisher = publisher();
        publisher
            .add(names::ACCOUNT_DELETED, AccountDeleted { accnt_id: AccountId::new(1) })
            .unwrap();
        publisher
            .add(
                names::UPSERT_POLICY,
                EventPayload::UpsertPolicy(PolicyTarget::new("1", "accounts", "1", "*")),
            )
            .unwrap();
        publisher
            .add(
                names::REMOVE_POLICY,
                EventPayload::RemovePolicy(PolicyTarget::new("1", "accounts", "1", "*")),
            )
            .unwrap();

        let result = publisher.publish_all(Some(&bus)).await;
        assert!(result.is_err());
        assert_eq!(bus.publish_attempts().await, 2);

        let published = bus.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "identitysvc.EventAccountDeleted");
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let publisher = publisher();
        assert!(publisher.is_empty());
        publisher.publish_all(None).await.unwrap();
    }
}
