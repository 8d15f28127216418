use std::str::FromStr;

use events::PolicyTarget;

use crate::error::PolicyError;

/// Wildcard for actions and resource IDs.
pub const WILDCARD: &str = "*";

/// A single authorization tuple.
///
/// The canonical string form is `sub:rtype:act:rid`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Grant {
    pub sub: String,
    pub rtype: String,
    pub act: String,
    pub rid: String,
}

impl Grant {
    pub fn new(
        sub: impl Into<String>,
        rtype: impl Into<String>,
        act: impl Into<String>,
        rid: impl Into<String>,
    ) -> Self {
        Self {
            sub: sub.into(),
            rtype: rtype.into(),
            act: act.into(),
            rid: rid.into(),
        }
    }
}

impl std::fmt::Display for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}:{}", self.sub, self.rtype, self.act, self.rid)
    }
}

impl FromStr for Grant {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [sub, rtype, act, rid] if parts.iter().all(|p| !p.is_empty()) => {
                Ok(Grant::new(*sub, *rtype, *act, *rid))
            }
            _ => Err(PolicyError::InvalidPolicy(s.to_string())),
        }
    }
}

impl From<PolicyTarget> for Grant {
    fn from(target: PolicyTarget) -> Self {
        Grant::new(
            target.subject,
            target.resource_type,
            target.action,
            target.resource_id,
        )
    }
}

impl From<Grant> for PolicyTarget {
    fn from(grant: Grant) -> Self {
        PolicyTarget::new(grant.sub, grant.rtype, grant.rid, grant.act)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_form() {
        let grant: Grant = "3:orders:get:7".parse().unwrap();
        assert_eq!(grant, Grant::new("3", "orders", "get", "7"));
        assert_eq!(grant.to_string(), "3:orders:get:7");
    }

    #[test]
    fn rejects_wrong_field_count() {
        for bad in ["3:orders:get", "3:orders:get:7:x", "", "3::get:7"] {
            assert!(matches!(
                bad.parse::<Grant>(),
                Err(PolicyError::InvalidPolicy(_))
            ));
        }
    }

    #[test]
    fn converts_from_event_target() {
        let target = PolicyTarget::new("1", "products", "*", "post");
        let grant = Grant::from(target.clone());
        assert_eq!(grant.to_string(), "1:products:post:*");
        assert_eq!(PolicyTarget::from(grant), target);
    }
}
