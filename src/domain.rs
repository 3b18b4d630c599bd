// cohort-sched: per-domain record
// Owned by the topology layer (§3 "Ownership"): mutated only by the
// reconfiguration coordinator, read by topology computation and dispatch.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::mask::CpuMask;
use crate::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DomainId(pub i32);

#[derive(Debug, Clone)]
pub struct Domain {
    pub id: DomainId,
    pub mask: CpuMask,
    pub policy: Policy,
    /// Set only after topology placement; `None` beforehand.
    pub cohort: Option<u32>,
}

impl Domain {
    pub fn new(id: DomainId, mask: CpuMask, policy: Policy) -> Self {
        Domain {
            id,
            mask,
            policy,
            cohort: None,
        }
    }
}

/// Table of live domain records, keyed by id. Owned by `Pool`; mutated
/// only by the reconfiguration coordinator (spec §3 "Lifecycle").
#[derive(Debug, Clone, Default)]
pub struct DomainTable(pub FxHashMap<DomainId, Domain>);

impl DomainTable {
    pub fn new() -> Self {
        DomainTable(FxHashMap::default())
    }

    pub fn get(&self, id: DomainId) -> Option<&Domain> {
        self.0.get(&id)
    }

    pub fn get_mut(&mut self, id: DomainId) -> Option<&mut Domain> {
        self.0.get_mut(&id)
    }

    pub fn insert(&mut self, domain: Domain) {
        self.0.insert(domain.id, domain);
    }

    pub fn remove(&mut self, id: DomainId) -> Option<Domain> {
        self.0.remove(&id)
    }

    pub fn contains(&self, id: DomainId) -> bool {
        self.0.contains_key(&id)
    }

    /// Domains in a deterministic order (ascending id), which the topology
    /// engine relies on for reproducible cohort construction (spec §4.4
    /// step 2: "arbitrary but deterministic order").
    pub fn sorted(&self) -> Vec<&Domain> {
        let mut v: Vec<&Domain> = self.0.values().collect();
        v.sort_by_key(|d| d.id.0);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::CpuMask;

    #[test]
    fn sorted_is_deterministic_by_id() {
        let mut table = DomainTable::new();
        table.insert(Domain::new(DomainId(3), CpuMask::single(0), Policy::None));
        table.insert(Domain::new(DomainId(1), CpuMask::single(1), Policy::None));
        table.insert(Domain::new(DomainId(2), CpuMask::single(2), Policy::None));

        let ids: Vec<i32> = table.sorted().iter().map(|d| d.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
