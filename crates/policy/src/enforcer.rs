//! Permission checks on top of a [`PolicyStorage`].

use std::sync::Arc;

use common::{Claims, action};
use events::PolicyMethod;

use crate::error::{PolicyError, Result};
use crate::grant::{Grant, WILDCARD};
use crate::storage::PolicyStorage;

/// Decides whether `grant` satisfies `request`.
pub type Matcher = fn(request: &Grant, grant: &Grant) -> bool;

/// Subject and resource type must be equal; action and resource ID must be
/// equal or wildcarded on the grant side.
pub fn default_matcher(request: &Grant, grant: &Grant) -> bool {
    request.sub == grant.sub
        && request.rtype == grant.rtype
        && (grant.act == request.act || grant.act == WILDCARD)
        && (grant.rid == request.rid || grant.rid == WILDCARD)
}

/// Outcome of resolving what a caller may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    /// The caller may see every resource of the type.
    Unrestricted,
    /// The caller may see only these resource IDs.
    Only(Vec<String>),
}

impl ResourceFilter {
    pub fn allows(&self, id: &str) -> bool {
        match self {
            ResourceFilter::Unrestricted => true,
            ResourceFilter::Only(ids) => ids.iter().any(|i| i == id),
        }
    }
}

/// Answers permission questions for one service.
#[derive(Clone)]
pub struct PolicyEnforcer {
    storage: Arc<dyn PolicyStorage>,
}

impl PolicyEnforcer {
    pub fn new(storage: Arc<dyn PolicyStorage>) -> Self {
        Self { storage }
    }

    /// Checks a `sub:rtype:act:rid` request against the subject's grants.
    ///
    /// Unparsable requests and lookup failures deny.
    pub async fn enforce(&self, request: &str, matcher: Option<Matcher>) -> bool {
        let request: Grant = match request.parse() {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "denying unparsable policy request");
                return false;
            }
        };
        let matcher = matcher.unwrap_or(default_matcher);

        match self.storage.get_policy_for_sub(&request.sub).await {
            Ok(grants) => grants.iter().any(|grant| matcher(&request, grant)),
            Err(e) => {
                tracing::warn!(%request, error = %e, "denying, policies unavailable");
                false
            }
        }
    }

    /// Resource IDs `sub` holds for exactly `(rtype, act)`.
    pub async fn get_resource_ids(&self, sub: &str, rtype: &str, act: &str) -> Vec<String> {
        match self.storage.get_policy_for_sub(sub).await {
            Ok(grants) => grants
                .into_iter()
                .filter(|g| g.rtype == rtype && g.act == act)
                .map(|g| g.rid)
                .collect(),
            Err(e) => {
                tracing::warn!(sub, rtype, act, error = %e, "no resource ids, policies unavailable");
                Vec::new()
            }
        }
    }

    /// Guards a write operation: the caller must be allowed `act` on
    /// `rtype/target`.
    pub async fn authorize(&self, claims: &Claims, rtype: &str, act: &str, target: &str) -> Result<()> {
        let request = Grant::new(claims.subject(), rtype, act, target).to_string();
        if self.enforce(&request, None).await {
            Ok(())
        } else {
            tracing::info!(%request, "permission denied");
            Err(PolicyError::InsufficientPermission)
        }
    }

    /// Resolves what a list operation may return for the caller.
    ///
    /// Looks at grants for the wildcard action and for `get`. A `*` resource
    /// ID in either means unrestricted.
    pub async fn resource_filter(&self, claims: &Claims, rtype: &str) -> Result<ResourceFilter> {
        let sub = claims.subject();
        let mut ids = self.get_resource_ids(&sub, rtype, action::ANY).await;
        for id in self.get_resource_ids(&sub, rtype, action::GET).await {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        if ids.is_empty() {
            return Err(PolicyError::InsufficientPermission);
        }
        if ids.iter().any(|id| id == WILDCARD) {
            return Ok(ResourceFilter::Unrestricted);
        }
        Ok(ResourceFilter::Only(ids))
    }

    /// Applies a `PolicyUpdated` change to the underlying storage.
    pub async fn update_policy(&self, method: PolicyMethod, grant: &Grant) -> Result<()> {
        self.storage.update_policy(method, grant).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matcher_wildcards_only_on_grant_side() {
        let grant = Grant::new("1", "orders", "*", "7");
        assert!(default_matcher(&Grant::new("1", "orders", "get", "7"), &grant));
        assert!(default_matcher(&Grant::new("1", "orders", "delete", "7"), &grant));
        assert!(!default_matcher(&Grant::new("1", "orders", "get", "8"), &grant));
        assert!(!default_matcher(&Grant::new("2", "orders", "get", "7"), &grant));
        assert!(!default_matcher(&Grant::new("1", "products", "get", "7"), &grant));

        let specific = Grant::new("1", "orders", "get", "7");
        assert!(!default_matcher(&Grant::new("1", "orders", "*", "*"), &specific));
    }

    #[test]
    fn filter_allows() {
        assert!(ResourceFilter::Unrestricted.allows("anything"));
        let only = ResourceFilter::Only(vec!["a".into()]);
        assert!(only.allows("a"));
        assert!(!only.allows("b"));
    }
}
