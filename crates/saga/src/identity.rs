//! Identity participant: account registration and removal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AccountId, Claims, CorrelationId, Role, action, resource};
use events::{
    AccountCreated, AccountDeleted, EventHandler, EventPayload, InboundEvent, PolicyUpdated, names,
};
use policy::{PolicyEnforcer, ResourceFilter};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::context::{EventContext, apply_policy_update, grant};
use crate::error::{Result, SagaError};
use crate::query::{QueryParams, Sortable};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Sortable for Account {
    fn compare_by(&self, other: &Self, field: &str) -> Option<std::cmp::Ordering> {
        match field {
            "created_at" | "updated_at" => Some(self.created_at.cmp(&other.created_at)),
            "name" => Some(self.name.cmp(&other.name)),
            "email" => Some(self.email.cmp(&other.email)),
            _ => None,
        }
    }
}

/// Registration data for a new account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Account storage.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Stores a new account and assigns its ID. Emails are unique.
    async fn create_account(&self, account: NewAccount) -> Result<Account>;

    /// One page of the accounts visible through `filter`.
    async fn list_accounts(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Account>>;

    /// Removes an account, returning it if it existed.
    async fn delete_account(&self, id: AccountId) -> Result<Option<Account>>;
}

#[derive(Debug, Default)]
struct AccountState {
    accounts: BTreeMap<AccountId, Account>,
    next_id: u64,
}

/// In-memory account repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountRepository {
    state: Arc<RwLock<AccountState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with [`SagaError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SagaError::StoreUnavailable("account store".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create_account(&self, account: NewAccount) -> Result<Account> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.accounts.values().any(|a| a.email == account.email) {
            return Err(SagaError::Conflict(format!(
                "email already registered: {}",
                account.email
            )));
        }

        state.next_id += 1;
        let account = Account {
            id: AccountId::new(state.next_id),
            name: account.name,
            email: account.email,
            role: account.role,
            created_at: Utc::now(),
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn list_accounts(
        &self,
        filter: &ResourceFilter,
        query: &QueryParams,
    ) -> Result<Vec<Account>> {
        self.check_available()?;
        let accounts = self
            .state
            .read()
            .await
            .accounts
            .values()
            .filter(|a| filter.allows(&a.id.to_string()))
            .cloned()
            .collect();
        Ok(query.apply(accounts))
    }

    async fn delete_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.check_available()?;
        Ok(self.state.write().await.accounts.remove(&id))
    }
}

/// Events consumed by the identity service.
#[derive(Debug, Clone)]
pub enum IdentityEvent {
    PolicyUpdated(PolicyUpdated),
}

impl InboundEvent for IdentityEvent {
    const NAMES: &'static [&'static str] = &[names::POLICY_UPDATED];

    fn from_payload(payload: EventPayload) -> Option<Self> {
        match payload {
            EventPayload::PolicyUpdated(p) => Some(IdentityEvent::PolicyUpdated(p)),
            _ => None,
        }
    }
}

/// Registers and removes accounts.
pub struct IdentityService<R> {
    repo: R,
    events: EventContext,
    enforcer: PolicyEnforcer,
}

impl<R: AccountRepository> IdentityService<R> {
    pub fn new(repo: R, events: EventContext, enforcer: PolicyEnforcer) -> Self {
        Self {
            repo,
            events,
            enforcer,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Registers an account. Open to unauthenticated callers.
    ///
    /// Announces the account and grants it full control over itself.
    #[tracing::instrument(skip(self, correlation_id, name), fields(%correlation_id))]
    pub async fn create_account(
        &self,
        correlation_id: &CorrelationId,
        name: &str,
        email: &str,
        role: Role,
    ) -> Result<Account> {
        if name.trim().is_empty() {
            return Err(SagaError::Validation("name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(SagaError::Validation(format!("invalid email: {email}")));
        }

        let account = self
            .repo
            .create_account(NewAccount {
                name: name.trim().to_string(),
                email: email.to_string(),
                role,
            })
            .await?;
        tracing::info!(account_id = %account.id, %role, "account created");

        let sub = account.id.subject();
        let mut publisher = self.events.publisher(correlation_id);
        publisher.add(
            names::ACCOUNT_CREATED,
            AccountCreated {
                accnt_id: account.id,
                role,
            },
        )?;
        grant(&mut publisher, &sub, resource::ACCOUNTS, &sub, action::ANY)?;
        self.events.publish(&publisher).await?;

        Ok(account)
    }

    /// Lists the accounts the caller may see.
    pub async fn list_accounts(
        &self,
        claims: &Claims,
        query: &QueryParams,
    ) -> Result<Vec<Account>> {
        let filter = self
            .enforcer
            .resource_filter(claims, resource::ACCOUNTS)
            .await?;
        self.repo.list_accounts(&filter, query).await
    }

    /// Deletes an account. The caller needs `delete` on it.
    #[tracing::instrument(skip(self, correlation_id, claims), fields(%correlation_id, caller = %claims.account_id))]
    pub async fn delete_account(
        &self,
        correlation_id: &CorrelationId,
        claims: &Claims,
        id: AccountId,
    ) -> Result<()> {
        self.enforcer
            .authorize(claims, resource::ACCOUNTS, action::DELETE, &id.to_string())
            .await?;

        if self.repo.delete_account(id).await?.is_none() {
            return Err(SagaError::not_found("Account", id));
        }
        tracing::info!(account_id = %id, "account deleted");

        let mut publisher = self.events.publisher(correlation_id);
        publisher.add(names::ACCOUNT_DELETED, AccountDeleted { accnt_id: id })?;
        self.events.publish(&publisher).await
    }
}

#[async_trait]
impl<R: AccountRepository + 'static> EventHandler for IdentityService<R> {
    type Event = IdentityEvent;
    type Error = SagaError;

    async fn handle(&self, _correlation_id: &CorrelationId, event: IdentityEvent) -> Result<()> {
        match event {
            IdentityEvent::PolicyUpdated(update) => {
                apply_policy_update(&self.enforcer, update).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Service;
    use events::{EventRegistry, InMemoryEventBus};
    use policy::{CacheConfig, CachedPolicyStorage, Grant, StaticPolicySource};

    async fn setup() -> (
        IdentityService<InMemoryAccountRepository>,
        InMemoryEventBus,
        StaticPolicySource,
    ) {
        let bus = InMemoryEventBus::new();
        let source = StaticPolicySource::new();
        let storage = CachedPolicyStorage::new(
            Arc::new(source.clone()),
            [resource::ACCOUNTS],
            CacheConfig::default(),
        );
        let service = IdentityService::new(
            InMemoryAccountRepository::new(),
            EventContext::new(
                Arc::new(EventRegistry::standard()),
                Arc::new(bus.clone()),
                Service::Identity,
            ),
            PolicyEnforcer::new(Arc::new(storage)),
        );
        (service, bus, source)
    }

    fn published_names(published: &[(String, Vec<u8>)]) -> Vec<String> {
        published.iter().map(|(s, _)| s.clone()).collect()
    }

    #[tokio::test]
    async fn create_account_announces_and_grants_self() {
        let (service, bus, _) = setup().await;
        let account = service
            .create_account(&CorrelationId::new("r1"), "Ana", "ana@example.com", Role::Customer)
            .await
            .unwrap();
        assert_eq!(account.id, AccountId::new(1));

        let published = bus.published().await;
        assert_eq!(
            published_names(&published),
            vec!["identitysvc.EventAccountCreated", "authzsvc.EventUpsertPolicy"]
        );
        let upsert: serde_json::Value = serde_json::from_slice(&published[1].1).unwrap();
        assert_eq!(upsert["payload"]["subject"], "1");
        assert_eq!(upsert["payload"]["resource_type"], "accounts");
        assert_eq!(upsert["payload"]["resource_id"], "1");
        assert_eq!(upsert["payload"]["action"], "*");
        assert_eq!(upsert["meta"]["req_id"], "r1");
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (service, _, _) = setup().await;
        let cid = CorrelationId::generate();
        service
            .create_account(&cid, "A", "a@example.com", Role::Seller)
            .await
            .unwrap();
        let err = service
            .create_account(&cid, "B", "a@example.com", Role::Seller)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::Conflict(_)));
    }

    #[tokio::test]
    async fn delete_requires_grant() {
        let (service, bus, source) = setup().await;
        let cid = CorrelationId::generate();
        let account = service
            .create_account(&cid, "A", "a@example.com", Role::Customer)
            .await
            .unwrap();
        let claims = Claims::new(account.id, "a@example.com", Role::Customer);

        let err = service
            .delete_account(&cid, &claims, account.id)
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());

        source.grant(Grant::new("1", "accounts", "*", "1")).await;
        service.delete_account(&cid, &claims, account.id).await.unwrap();
        assert_eq!(service.repository().account_count().await, 0);
        assert!(
            published_names(&bus.published().await)
                .contains(&"identitysvc.EventAccountDeleted".to_string())
        );
    }

    #[tokio::test]
    async fn unavailable_store_is_retryable() {
        use events::Retryable;
        let (service, _, _) = setup().await;
        service.repository().set_unavailable(true);
        let err = service
            .create_account(&CorrelationId::generate(), "A", "a@example.com", Role::Customer)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
