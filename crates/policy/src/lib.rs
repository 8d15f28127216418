//! Authorization cache and enforcement.
//!
//! Every service keeps a read-through cache of the grants held by the
//! subjects it has seen. Misses are filled from the authorization service
//! through a [`PolicySource`]; `PolicyUpdated` events patch resident entries
//! through [`PolicyStorage::update_policy`].

pub mod enforcer;
pub mod error;
pub mod grant;
pub mod policy_set;
pub mod source;
pub mod storage;

pub use enforcer::{Matcher, PolicyEnforcer, ResourceFilter, default_matcher};
pub use error::{PolicyError, Result};
pub use grant::Grant;
pub use policy_set::PolicySet;
pub use source::{HttpPolicySource, PoliciesResponse, PolicySource, StaticPolicySource};
pub use storage::{CacheConfig, CachedPolicyStorage, PolicyStorage};
