// cohort-sched: waiting-for-event set (E)
// Keyed by domain id; a ticket sits here iff its domain is event-triggered
// and currently inactive awaiting an external trigger, or transiently
// during a reconfiguration-driven park.

use rustc_hash::FxHashMap;

use crate::domain::DomainId;
use crate::ticket::TicketId;

#[derive(Debug, Default)]
pub struct WaitingSet(FxHashMap<DomainId, TicketId>);

impl WaitingSet {
    pub fn new() -> Self {
        WaitingSet(FxHashMap::default())
    }

    pub fn insert(&mut self, domain: DomainId, ticket: TicketId) {
        self.0.insert(domain, ticket);
    }

    pub fn remove(&mut self, domain: DomainId) -> Option<TicketId> {
        self.0.remove(&domain)
    }

    pub fn remove_ticket(&mut self, ticket: TicketId) -> bool {
        let domain = self
            .0
            .iter()
            .find(|(_, t)| **t == ticket)
            .map(|(d, _)| *d);
        match domain {
            Some(d) => {
                self.0.remove(&d);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, domain: DomainId) -> Option<TicketId> {
        self.0.get(&domain).copied()
    }

    pub fn contains_ticket(&self, ticket: TicketId) -> bool {
        self.0.values().any(|t| *t == ticket)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_lookup_remove_round_trip() {
        let mut w = WaitingSet::new();
        w.insert(DomainId(1), TicketId(5));
        assert_eq!(w.get(DomainId(1)), Some(TicketId(5)));
        assert_eq!(w.remove(DomainId(1)), Some(TicketId(5)));
        assert_eq!(w.get(DomainId(1)), None);
    }

    #[test]
    fn remove_ticket_by_reference() {
        let mut w = WaitingSet::new();
        w.insert(DomainId(9), TicketId(3));
        assert!(w.remove_ticket(TicketId(3)));
        assert!(!w.contains_ticket(TicketId(3)));
        assert!(!w.remove_ticket(TicketId(3)));
    }
}
