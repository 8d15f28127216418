//! Read-through per-subject policy cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use events::PolicyMethod;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::error::{PolicyError, Result};
use crate::grant::Grant;
use crate::policy_set::PolicySet;
use crate::source::PolicySource;

/// Access to the grants of a subject, as seen by one service.
#[async_trait]
pub trait PolicyStorage: Send + Sync {
    /// Returns every grant `sub` holds on the resource types this service
    /// handles.
    async fn get_policy_for_sub(&self, sub: &str) -> Result<Vec<Grant>>;

    /// Applies a change broadcast by the authorization service.
    ///
    /// Fails with [`PolicyError::UnsupportedRtype`] for resource types this
    /// service does not handle and with [`PolicyError::SubNotCached`] when
    /// the subject is not resident. Both are benign.
    async fn update_policy(&self, method: PolicyMethod, grant: &Grant) -> Result<()>;
}

/// Cache timing.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Idle time after which an entry is re-fetched. Every hit restarts it.
    pub ttl: Duration,
    /// How often [`CachedPolicyStorage::spawn_janitor`] sweeps expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Debug)]
struct Slot {
    policies: Option<PolicySet>,
    expires_at: Instant,
}

impl Slot {
    fn empty() -> Self {
        Self {
            policies: None,
            expires_at: Instant::now(),
        }
    }

    fn resident(&mut self, now: Instant) -> Option<&mut PolicySet> {
        if self.expires_at <= now {
            return None;
        }
        self.policies.as_mut()
    }
}

/// Policy cache keyed by subject.
///
/// Each subject has its own slot lock, so a miss-fetch and a concurrent
/// update for the same subject are applied one after the other while
/// different subjects proceed in parallel. Subjects with no grants are never
/// cached.
pub struct CachedPolicyStorage {
    source: Arc<dyn PolicySource>,
    resource_types: Vec<String>,
    config: CacheConfig,
    slots: RwLock<HashMap<String, Arc<Mutex<Slot>>>>,
}

impl CachedPolicyStorage {
    pub fn new(
        source: Arc<dyn PolicySource>,
        resource_types: impl IntoIterator<Item = impl Into<String>>,
        config: CacheConfig,
    ) -> Self {
        Self {
            source,
            resource_types: resource_types.into_iter().map(Into::into).collect(),
            config,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn resource_types(&self) -> &[String] {
        &self.resource_types
    }

    fn handles(&self, rtype: &str) -> bool {
        self.resource_types.iter().any(|r| r == rtype)
    }

    async fn slot(&self, sub: &str) -> Arc<Mutex<Slot>> {
        if let Some(slot) = self.slots.read().await.get(sub) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(sub.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::empty())))
            .clone()
    }

    /// Fetches every handled resource type for `sub`. The second value is
    /// false when at least one fetch failed.
    async fn fetch(&self, sub: &str) -> Result<(PolicySet, bool)> {
        let mut set = PolicySet::new();
        let mut failures = Vec::new();

        for rtype in &self.resource_types {
            match self.source.list_policies(sub, rtype).await {
                Ok(policies) => {
                    for policy in policies {
                        match policy.parse::<Grant>() {
                            Ok(grant) if grant.sub == sub => {
                                set.upsert(&grant.rtype, &grant.act, &grant.rid);
                            }
                            Ok(grant) => {
                                tracing::warn!(%grant, sub, "ignoring grant for another subject");
                            }
                            Err(e) => tracing::warn!(error = %e, "ignoring unparsable policy"),
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(sub, rtype = %rtype, error = %e, "failed to fetch policies");
                    failures.push(e);
                }
            }
        }

        if !failures.is_empty() && failures.len() == self.resource_types.len() {
            return Err(failures.remove(0));
        }
        Ok((set, failures.is_empty()))
    }

    /// Drops every entry whose TTL has passed. Returns how many were removed.
    ///
    /// Slots that are locked at the time of the sweep are left alone.
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| match slot.try_lock() {
            Ok(mut guard) => guard.resident(now).is_some(),
            Err(_) => true,
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            tracing::debug!(evicted, "evicted expired policy cache entries");
        }
        evicted
    }

    /// Number of subjects with a resident, unexpired entry.
    pub async fn cached_subjects(&self) -> usize {
        let now = Instant::now();
        let slots: Vec<_> = self.slots.read().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.resident(now).is_some() {
                count += 1;
            }
        }
        count
    }

    /// Runs [`Self::evict_expired`] periodically until the returned task is
    /// aborted.
    pub fn spawn_janitor(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let storage = Arc::downgrade(self);
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(storage) = storage.upgrade() else {
                    break;
                };
                storage.evict_expired().await;
            }
        })
    }
}

#[async_trait]
impl PolicyStorage for CachedPolicyStorage {
    #[tracing::instrument(skip(self))]
    async fn get_policy_for_sub(&self, sub: &str) -> Result<Vec<Grant>> {
        let slot = self.slot(sub).await;
        let mut slot = slot.lock().await;
        let now = Instant::now();

        if let Some(policies) = slot.resident(now) {
            let grants = policies.grants(sub);
            slot.expires_at = now + self.config.ttl;
            metrics::counter!("policy_cache_hits_total").increment(1);
            return Ok(grants);
        }

        metrics::counter!("policy_cache_misses_total").increment(1);
        let (set, complete) = self.fetch(sub).await?;
        let grants = set.grants(sub);

        if complete && !set.is_empty() {
            slot.policies = Some(set);
            slot.expires_at = Instant::now() + self.config.ttl;
        } else {
            slot.policies = None;
        }
        Ok(grants)
    }

    #[tracing::instrument(skip(self), fields(grant = %grant))]
    async fn update_policy(&self, method: PolicyMethod, grant: &Grant) -> Result<()> {
        if !self.handles(&grant.rtype) {
            return Err(PolicyError::UnsupportedRtype(grant.rtype.clone()));
        }

        let Some(slot) = self.slots.read().await.get(&grant.sub).cloned() else {
            return Err(PolicyError::SubNotCached(grant.sub.clone()));
        };
        let mut slot = slot.lock().await;
        let Some(policies) = slot.resident(Instant::now()) else {
            return Err(PolicyError::SubNotCached(grant.sub.clone()));
        };

        match method {
            PolicyMethod::Put => {
                policies.upsert(&grant.rtype, &grant.act, &grant.rid);
            }
            PolicyMethod::Delete => {
                policies.remove(&grant.rtype, &grant.act, &grant.rid);
            }
        }
        tracing::debug!(%method, "applied policy update");
        Ok(())
    }
}
