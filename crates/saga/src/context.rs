//! Event plumbing shared by the participants.

use std::sync::Arc;

use common::{CorrelationId, Service};
use events::{EventBus, EventPayload, EventRegistry, PolicyTarget, PolicyUpdated, Publisher, names};
use policy::{Grant, PolicyEnforcer};

use crate::error::Result;

/// What a participant needs to emit events.
#[derive(Clone)]
pub struct EventContext {
    registry: Arc<EventRegistry>,
    bus: Arc<dyn EventBus>,
    service: Service,
}

impl EventContext {
    pub fn new(registry: Arc<EventRegistry>, bus: Arc<dyn EventBus>, service: Service) -> Self {
        Self {
            registry,
            bus,
            service,
        }
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// Starts a batch for one unit of work.
    pub fn publisher(&self, correlation_id: &CorrelationId) -> Publisher {
        Publisher::new(
            self.registry.clone(),
            self.service.as_str(),
            correlation_id.clone(),
        )
    }

    /// Publishes a batch. Call only after the local change is committed.
    pub async fn publish(&self, publisher: &Publisher) -> Result<()> {
        if publisher.is_empty() {
            return Ok(());
        }
        publisher.publish_all(Some(self.bus.as_ref())).await?;
        tracing::debug!(events = ?publisher.event_names(), "published events");
        Ok(())
    }
}

/// Queues a request to the authorization service to grant `act` on
/// `rtype/rid` to `sub`.
pub fn grant(publisher: &mut Publisher, sub: &str, rtype: &str, rid: &str, act: &str) -> Result<()> {
    publisher.add(
        names::UPSERT_POLICY,
        EventPayload::UpsertPolicy(PolicyTarget::new(sub, rtype, rid, act)),
    )?;
    Ok(())
}

/// Patches the local policy cache from a `PolicyUpdated` event.
///
/// A subject that is not resident or a resource type this service does not
/// handle is nothing to do, not a failure.
pub async fn apply_policy_update(enforcer: &PolicyEnforcer, update: PolicyUpdated) -> Result<()> {
    let method = update.method;
    let grant = Grant::from(update.target);
    match enforcer.update_policy(method, &grant).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_benign() => {
            tracing::debug!(%grant, %method, reason = %e, "policy update skipped");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
