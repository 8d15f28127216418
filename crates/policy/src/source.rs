//! Upstream sources of truth for the policy cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{PolicyError, Result};
use crate::grant::Grant;

/// Body of the authorization service's policy listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoliciesResponse {
    pub policies: Vec<String>,
}

/// Lists the grants a subject holds on one resource type, in canonical
/// string form.
#[async_trait]
pub trait PolicySource: Send + Sync {
    async fn list_policies(&self, sub: &str, rtype: &str) -> Result<Vec<String>>;
}

/// Queries the authorization service over HTTP:
/// `GET <url>?sub=<sub>&resource_type=<rtype>`.
#[derive(Debug, Clone)]
pub struct HttpPolicySource {
    client: reqwest::Client,
    url: String,
}

impl HttpPolicySource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PolicySource for HttpPolicySource {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn list_policies(&self, sub: &str, rtype: &str) -> Result<Vec<String>> {
        let response: PoliciesResponse = self
            .client
            .get(&self.url)
            .query(&[("sub", sub), ("resource_type", rtype)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.policies)
    }
}

#[derive(Debug, Default)]
struct StaticState {
    grants: HashMap<String, Vec<Grant>>,
}

/// Fixed in-memory policy source for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicySource {
    state: Arc<RwLock<StaticState>>,
    calls: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl StaticPolicySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant(&self, grant: Grant) {
        let mut state = self.state.write().await;
        let grants = state.grants.entry(grant.sub.clone()).or_default();
        if !grants.contains(&grant) {
            grants.push(grant);
        }
    }

    pub async fn revoke(&self, grant: &Grant) {
        if let Some(grants) = self.state.write().await.grants.get_mut(&grant.sub) {
            grants.retain(|g| g != grant);
        }
    }

    /// Makes every subsequent call fail as if the upstream were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `list_policies` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn list_policies(&self, sub: &str, rtype: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PolicyError::Upstream("static source unavailable".to_string()));
        }
        Ok(self
            .state
            .read()
            .await
            .grants
            .get(sub)
            .map(|grants| {
                grants
                    .iter()
                    .filter(|g| g.rtype == rtype)
                    .map(Grant::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_filters_by_rtype() {
        let source = StaticPolicySource::new();
        source.grant(Grant::new("1", "orders", "post", "*")).await;
        source.grant(Grant::new("1", "products", "get", "*")).await;
        source.grant(Grant::new("1", "orders", "post", "*")).await;

        let orders = source.list_policies("1", "orders").await.unwrap();
        assert_eq!(orders, vec!["1:orders:post:*"]);
        assert!(source.list_policies("2", "orders").await.unwrap().is_empty());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn unavailable_source_errors() {
        let source = StaticPolicySource::new();
        source.set_unavailable(true);
        let err = source.list_policies("1", "orders").await.unwrap_err();
        assert!(err.is_transient());
    }
}
