// cohort-sched: time-ordered ticket queues (EDF queue C, activation queue D)
// The abstract hash-table/rbtree containers spec treats as external
// collaborators are realized here with `BTreeSet` (the ordered-set
// container) plus a side index for O(log n) remove-by-ref, which is the
// idiomatic Rust analogue of an intrusive rbtree node.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::domain::DomainId;
use crate::ticket::TicketId;

/// Sort key shared by both queues: `(primary, domain_id)`, total-ordered,
/// with domain id as the mandatory tie-break (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey {
    pub primary: u64,
    pub domain: DomainId,
}

/// Generic time-ordered set of tickets. `K` is the primary ordering field
/// (deadline for the EDF queue, earliest-start-time for the activation
/// queue); ties break on domain id via [`OrderKey`].
pub struct OrderedQueue {
    set: BTreeSet<(OrderKey, TicketId)>,
    index: FxHashMap<TicketId, OrderKey>,
}

impl OrderedQueue {
    pub fn new() -> Self {
        OrderedQueue {
            set: BTreeSet::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn insert(&mut self, primary: u64, domain: DomainId, ticket: TicketId) {
        let key = OrderKey { primary, domain };
        self.set.insert((key, ticket));
        self.index.insert(ticket, key);
    }

    /// Remove and return the earliest-ordered ticket, if any.
    pub fn pop_min(&mut self) -> Option<TicketId> {
        let (key, ticket) = self.set.iter().next().copied()?;
        self.set.remove(&(key, ticket));
        self.index.remove(&ticket);
        Some(ticket)
    }

    pub fn peek_min_key(&self) -> Option<u64> {
        self.set.iter().next().map(|(k, _)| k.primary)
    }

    /// Remove a specific ticket by reference. Spec §4.1: "Remove-by-ref
    /// must zero the link fields in the ticket so subsequent insertion
    /// elsewhere is safe" — the link fields here are the `(key, ticket)`
    /// tuple in `set` and the `index` entry; both are excised atomically.
    pub fn remove(&mut self, ticket: TicketId) -> bool {
        if let Some(key) = self.index.remove(&ticket) {
            self.set.remove(&(key, ticket));
            true
        } else {
            false
        }
    }

    pub fn contains(&self, ticket: TicketId) -> bool {
        self.index.contains_key(&ticket)
    }

    /// Find a ticket belonging to `domain`, if the queue holds one.
    /// O(n) — only used off the dispatcher hot path (space-fill
    /// substitution search, admission diagnostics).
    pub fn find_by_domain(&self, domain: DomainId) -> Option<TicketId> {
        self.index
            .iter()
            .find(|(_, key)| key.domain == domain)
            .map(|(ticket, _)| *ticket)
    }

    /// Iterate tickets in ascending key order (deadline/domain_id or
    /// est/domain_id, per the instance). Used to verify invariant 5 of
    /// spec §8 in tests and for space-fill substitute scanning.
    pub fn iter_ordered(&self) -> impl Iterator<Item = TicketId> + '_ {
        self.set.iter().map(|(_, t)| *t)
    }
}

impl Default for OrderedQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_min_is_monotone_in_primary_then_domain() {
        let mut q = OrderedQueue::new();
        q.insert(100, DomainId(2), TicketId(1));
        q.insert(100, DomainId(1), TicketId(2));
        q.insert(50, DomainId(5), TicketId(3));

        assert_eq!(q.pop_min(), Some(TicketId(3))); // primary 50 first
        assert_eq!(q.pop_min(), Some(TicketId(2))); // tie on 100, domain 1 first
        assert_eq!(q.pop_min(), Some(TicketId(1)));
        assert_eq!(q.pop_min(), None);
    }

    #[test]
    fn remove_by_ref_excises_from_both_structures() {
        let mut q = OrderedQueue::new();
        q.insert(10, DomainId(1), TicketId(1));
        assert!(q.remove(TicketId(1)));
        assert!(!q.contains(TicketId(1)));
        assert_eq!(q.len(), 0);
        // removing again is a no-op, not a panic
        assert!(!q.remove(TicketId(1)));
    }

    #[test]
    fn find_by_domain_locates_ticket() {
        let mut q = OrderedQueue::new();
        q.insert(10, DomainId(7), TicketId(9));
        assert_eq!(q.find_by_domain(DomainId(7)), Some(TicketId(9)));
        assert_eq!(q.find_by_domain(DomainId(8)), None);
    }
}
