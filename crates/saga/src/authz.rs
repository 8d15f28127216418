//! Authorization participant: the source of truth for grants.
//!
//! Other services ask for grants through events and learn about changes
//! from the `PolicyUpdated` broadcast. Their caches fill misses from
//! [`AuthzService::list_policies`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{AccountId, CorrelationId};
use events::{
    AccountDeleted, EventHandler, EventPayload, InboundEvent, PolicyMethod, PolicyTarget,
    PolicyUpdated, names,
};
use policy::{Grant, PolicyError, PolicySource};
use tokio::sync::RwLock;

use crate::context::EventContext;
use crate::error::{Result, SagaError};

/// Grant storage.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Stores a grant. Returns false if it was already present.
    async fn upsert(&self, grant: &Grant) -> Result<bool>;

    /// Removes a grant. Returns false if it was absent.
    async fn remove(&self, grant: &Grant) -> Result<bool>;

    /// Removes and returns every grant held by `sub`.
    async fn remove_by_sub(&self, sub: &str) -> Result<Vec<Grant>>;

    async fn list(&self, sub: &str, rtype: Option<&str>) -> Result<Vec<Grant>>;
}

/// In-memory grant repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPolicyRepository {
    grants: Arc<RwLock<BTreeSet<Grant>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SagaError::StoreUnavailable("policy store".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn upsert(&self, grant: &Grant) -> Result<bool> {
        self.check_available()?;
        Ok(self.grants.write().await.insert(grant.clone()))
    }

    async fn remove(&self, grant: &Grant) -> Result<bool> {
        self.check_available()?;
        Ok(self.grants.write().await.remove(grant))
    }

    async fn remove_by_sub(&self, sub: &str) -> Result<Vec<Grant>> {
        self.check_available()?;
        let mut grants = self.grants.write().await;
        let removed: Vec<Grant> = grants.iter().filter(|g| g.sub == sub).cloned().collect();
        for grant in &removed {
            grants.remove(grant);
        }
        Ok(removed)
    }

    async fn list(&self, sub: &str, rtype: Option<&str>) -> Result<Vec<Grant>> {
        self.check_available()?;
        Ok(self
            .grants
            .read()
            .await
            .iter()
            .filter(|g| g.sub == sub && rtype.is_none_or(|r| g.rtype == r))
            .cloned()
            .collect())
    }
}

/// Events consumed by the authorization service.
#[derive(Debug, Clone)]
pub enum AuthzEvent {
    UpsertPolicy(PolicyTarget),
    RemovePolicy(PolicyTarget),
    AccountDeleted(AccountDeleted),
}

impl InboundEvent for AuthzEvent {
    const NAMES: &'static [&'static str] = &[
        names::UPSERT_POLICY,
        names::REMOVE_POLICY,
        names::ACCOUNT_DELETED,
    ];

    fn from_payload(payload: EventPayload) -> Option<Self> {
        match payload {
            EventPayload::UpsertPolicy(p) => Some(AuthzEvent::UpsertPolicy(p)),
            EventPayload::RemovePolicy(p) => Some(AuthzEvent::RemovePolicy(p)),
            EventPayload::AccountDeleted(p) => Some(AuthzEvent::AccountDeleted(p)),
            _ => None,
        }
    }
}

/// Owns the grants and broadcasts every change.
pub struct AuthzService<R> {
    repo: R,
    events: EventContext,
}

impl<R: PolicyRepository> AuthzService<R> {
    pub fn new(repo: R, events: EventContext) -> Self {
        Self { repo, events }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Stores a grant and broadcasts it.
    ///
    /// The broadcast goes out even when the grant already existed so a cache
    /// that missed the first one converges on redelivery.
    #[tracing::instrument(skip(self, correlation_id, grant), fields(%correlation_id, %grant))]
    pub async fn upsert_policy(&self, correlation_id: &CorrelationId, grant: Grant) -> Result<()> {
        validate(&grant)?;
        if self.repo.upsert(&grant).await? {
            tracing::info!("policy added");
            metrics::counter!("policies_upserted_total").increment(1);
        }
        self.broadcast(correlation_id, &[(PolicyMethod::Put, grant)]).await
    }

    #[tracing::instrument(skip(self, correlation_id, grant), fields(%correlation_id, %grant))]
    pub async fn remove_policy(&self, correlation_id: &CorrelationId, grant: Grant) -> Result<()> {
        validate(&grant)?;
        if self.repo.remove(&grant).await? {
            tracing::info!("policy removed");
            metrics::counter!("policies_removed_total").increment(1);
        }
        self.broadcast(correlation_id, &[(PolicyMethod::Delete, grant)]).await
    }

    /// Drops every grant held by a deleted account.
    #[tracing::instrument(skip(self, correlation_id), fields(%correlation_id))]
    pub async fn remove_policies_for_sub(
        &self,
        correlation_id: &CorrelationId,
        account_id: AccountId,
    ) -> Result<()> {
        let removed = self.repo.remove_by_sub(&account_id.subject()).await?;
        tracing::info!(count = removed.len(), "policies removed for deleted account");
        metrics::counter!("policies_removed_total").increment(removed.len() as u64);

        let changes: Vec<_> = removed
            .into_iter()
            .map(|grant| (PolicyMethod::Delete, grant))
            .collect();
        self.broadcast(correlation_id, &changes).await
    }

    /// Lists `sub`'s grants on `rtype` in canonical string form.
    pub async fn list_policies(&self, sub: &str, rtype: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .repo
            .list(sub, rtype)
            .await?
            .iter()
            .map(Grant::to_string)
            .collect())
    }

    async fn broadcast(
        &self,
        correlation_id: &CorrelationId,
        changes: &[(PolicyMethod, Grant)],
    ) -> Result<()> {
        let mut publisher = self.events.publisher(correlation_id);
        for (method, grant) in changes {
            publisher.add(
                names::POLICY_UPDATED,
                PolicyUpdated {
                    method: *method,
                    target: PolicyTarget::from(grant.clone()),
                },
            )?;
        }
        self.events.publish(&publisher).await
    }
}

fn validate(grant: &Grant) -> Result<()> {
    let fields = [&grant.sub, &grant.rtype, &grant.act, &grant.rid];
    if fields.iter().any(|f| f.is_empty() || f.contains(':')) {
        return Err(SagaError::Validation(format!("invalid grant: {grant}")));
    }
    Ok(())
}

#[async_trait]
impl<R: PolicyRepository + 'static> EventHandler for AuthzService<R> {
    type Event = AuthzEvent;
    type Error = SagaError;

    async fn handle(&self, correlation_id: &CorrelationId, event: AuthzEvent) -> Result<()> {
        match event {
            AuthzEvent::UpsertPolicy(target) => {
                self.upsert_policy(correlation_id, target.into()).await
            }
            AuthzEvent::RemovePolicy(target) => {
                self.remove_policy(correlation_id, target.into()).await
            }
            AuthzEvent::AccountDeleted(deleted) => {
                self.remove_policies_for_sub(correlation_id, deleted.accnt_id)
                    .await
            }
        }
    }
}

#[async_trait]
impl<R: PolicyRepository> PolicySource for AuthzService<R> {
    async fn list_policies(&self, sub: &str, rtype: &str) -> policy::Result<Vec<String>> {
        AuthzService::list_policies(self, sub, Some(rtype))
            .await
            .map_err(|e| PolicyError::Upstream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Service;
    use events::{EventRegistry, InMemoryEventBus};

    fn setup() -> (AuthzService<InMemoryPolicyRepository>, InMemoryEventBus) {
        let bus = InMemoryEventBus::new();
        let service = AuthzService::new(
            InMemoryPolicyRepository::new(),
            EventContext::new(
                Arc::new(EventRegistry::standard()),
                Arc::new(bus.clone()),
                Service::Authz,
            ),
        );
        (service, bus)
    }

    fn methods(published: &[(String, Vec<u8>)]) -> Vec<String> {
        published
            .iter()
            .map(|(_, body)| {
                let value: serde_json::Value = serde_json::from_slice(body).unwrap();
                value["payload"]["method"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn upsert_is_deduplicated_but_always_broadcast() {
        let (service, bus) = setup();
        let cid = CorrelationId::new("r1");
        let grant = Grant::new("1", "orders", "get", "7");

        service.upsert_policy(&cid, grant.clone()).await.unwrap();
        service.upsert_policy(&cid, grant).await.unwrap();

        assert_eq!(
            service.list_policies("1", Some("orders")).await.unwrap(),
            vec!["1:orders:get:7"]
        );
        let published = bus.published().await;
        assert_eq!(published.len(), 2);
        assert!(published.iter().all(|(s, _)| s == "authzsvc.EventPolicyUpdated"));
        assert_eq!(methods(&published), vec!["put", "put"]);
    }

    #[tokio::test]
    async fn list_filters_by_subject_and_rtype() {
        let (service, _) = setup();
        let cid = CorrelationId::generate();
        service
            .upsert_policy(&cid, Grant::new("1", "orders", "get", "7"))
            .await
            .unwrap();
        service
            .upsert_policy(&cid, Grant::new("1", "products", "get", "*"))
            .await
            .unwrap();
        service
            .upsert_policy(&cid, Grant::new("2", "orders", "*", "*"))
            .await
            .unwrap();

        assert_eq!(service.list_policies("1", None).await.unwrap().len(), 2);
        assert_eq!(
            PolicySource::list_policies(&service, "1", "products")
                .await
                .unwrap(),
            vec!["1:products:get:*"]
        );
        assert!(service.list_policies("3", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn account_deletion_revokes_everything() {
        let (service, bus) = setup();
        let cid = CorrelationId::generate();
        service
            .upsert_policy(&cid, Grant::new("1", "accounts", "*", "1"))
            .await
            .unwrap();
        service
            .upsert_policy(&cid, Grant::new("1", "orders", "post", "*"))
            .await
            .unwrap();
        service
            .upsert_policy(&cid, Grant::new("2", "orders", "post", "*"))
            .await
            .unwrap();

        service
            .handle(
                &cid,
                AuthzEvent::AccountDeleted(AccountDeleted {
                    accnt_id: AccountId::new(1),
                }),
            )
            .await
            .unwrap();

        assert!(service.list_policies("1", None).await.unwrap().is_empty());
        assert_eq!(service.list_policies("2", None).await.unwrap().len(), 1);
        let published = bus.published().await;
        assert_eq!(methods(&published[3..]), vec!["delete", "delete"]);
    }

    #[tokio::test]
    async fn rejects_malformed_grants() {
        let (service, bus) = setup();
        let err = service
            .upsert_policy(&CorrelationId::generate(), Grant::new("1", "", "get", "7"))
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));
        assert!(bus.published().await.is_empty());
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_upstream_failure() {
        let (service, _) = setup();
        service.repository().set_unavailable(true);
        let err = PolicySource::list_policies(&service, "1", "orders")
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
