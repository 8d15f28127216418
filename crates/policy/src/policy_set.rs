use std::collections::BTreeMap;

use crate::grant::Grant;

/// Grants held by one subject, indexed `rtype -> act -> [rid]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    by_rtype: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource ID under `(rtype, act)`. Returns false if it was
    /// already present.
    pub fn upsert(&mut self, rtype: &str, act: &str, rid: &str) -> bool {
        let rids = self
            .by_rtype
            .entry(rtype.to_string())
            .or_default()
            .entry(act.to_string())
            .or_default();
        if rids.iter().any(|r| r == rid) {
            return false;
        }
        rids.push(rid.to_string());
        true
    }

    /// Removes the exact `(rtype, act, rid)` tuple. Returns false if absent.
    pub fn remove(&mut self, rtype: &str, act: &str, rid: &str) -> bool {
        let Some(acts) = self.by_rtype.get_mut(rtype) else {
            return false;
        };
        let Some(rids) = acts.get_mut(act) else {
            return false;
        };
        let before = rids.len();
        rids.retain(|r| r != rid);
        let removed = rids.len() != before;

        if rids.is_empty() {
            acts.remove(act);
        }
        if acts.is_empty() {
            self.by_rtype.remove(rtype);
        }
        removed
    }

    /// Resource IDs held for exactly `(rtype, act)`.
    pub fn resource_ids(&self, rtype: &str, act: &str) -> Vec<String> {
        self.by_rtype
            .get(rtype)
            .and_then(|acts| acts.get(act))
            .cloned()
            .unwrap_or_default()
    }

    /// Flattens the set into grants for `sub`.
    pub fn grants(&self, sub: &str) -> Vec<Grant> {
        self.by_rtype
            .iter()
            .flat_map(|(rtype, acts)| {
                acts.iter().flat_map(move |(act, rids)| {
                    rids.iter().map(move |rid| Grant::new(sub, rtype, act, rid))
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rtype.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_rtype
            .values()
            .flat_map(|acts| acts.values())
            .map(Vec::len)
            .sum()
    }
}

impl FromIterator<Grant> for PolicySet {
    fn from_iter<I: IntoIterator<Item = Grant>>(iter: I) -> Self {
        let mut set = PolicySet::new();
        for grant in iter {
            set.upsert(&grant.rtype, &grant.act, &grant.rid);
        }
        set
    }
}
