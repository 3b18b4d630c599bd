// cohort-sched: per-vCPU scheduling record and arena
// Tickets are arena-indexed (Design Notes: "queue nodes embed arena
// indices, not pointers") so reconfiguration's wholesale rebuild costs no
// heap churn beyond the arena's own fixed allocation.

use bitflags::bitflags;

use crate::domain::DomainId;
use crate::time::INFINITY;

/// Index into a `TicketArena`. Stable for the ticket's lifetime; reused
/// only after the slot is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TicketId(pub u32);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TicketFlags: u8 {
        /// Ticket should yield its current slice after this dispatch.
        const SINGLE_VCPU_YIELD     = 0b001;
        /// The owning vCPU is sleeping/blocked (eligible as a space-fill
        /// substitute target).
        const SLEEPING              = 0b010;
        /// Ticket was parked in the waiting-for-event set before its most
        /// recent activation.
        const WAS_WAITING_FOR_EVENT = 0b100;
    }
}

/// Which container currently owns a ticket. Spec invariant: a ticket's
/// location is uniquely determined and observable — we make that literal
/// by storing it on the ticket itself rather than inferring it from which
/// collection happens to hold a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Edf,
    Activation,
    Waiting,
    Dispatched,
}

#[derive(Debug, Clone)]
pub struct Ticket {
    pub vcpu: u32,
    pub domain: DomainId,
    pub earliest_start_time: u64,
    pub deadline: u64,
    pub remaining_time: u64,
    pub activated_at: u64,
    pub flags: TicketFlags,
    pub on_my_behalf: Option<TicketId>,
    pub location: Location,
}

impl Ticket {
    pub fn new(vcpu: u32, domain: DomainId) -> Self {
        Ticket {
            vcpu,
            domain,
            earliest_start_time: 0,
            deadline: INFINITY,
            remaining_time: INFINITY,
            activated_at: INFINITY,
            flags: TicketFlags::empty(),
            on_my_behalf: None,
            location: Location::Waiting,
        }
    }

    pub fn is_permanent_remaining(&self) -> bool {
        self.remaining_time == INFINITY
    }
}

/// Fixed-capacity slab of tickets, sized to `MAX_DOMAINS * max_vcpus` at
/// construction (Design Notes' arena discipline). Freed slots are reused
/// via a free list so no allocation happens on the dispatcher hot path.
pub struct TicketArena {
    slots: Vec<Option<Ticket>>,
    free: Vec<u32>,
    cap: usize,
}

impl TicketArena {
    pub fn with_capacity(capacity: usize) -> Self {
        TicketArena {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            cap: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocate a slot for `ticket`. Fails with `Err(ticket)` when the
    /// arena is at capacity and has no free slot to reuse — callers
    /// surface this as a `GangSchedError::Resource`.
    pub fn insert(&mut self, ticket: Ticket) -> Result<TicketId, Ticket> {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Some(ticket);
            return Ok(TicketId(idx));
        }
        if self.slots.len() >= self.cap {
            return Err(ticket);
        }
        let idx = self.slots.len() as u32;
        self.slots.push(Some(ticket));
        Ok(TicketId(idx))
    }

    pub fn get(&self, id: TicketId) -> Option<&Ticket> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: TicketId) -> Option<&mut Ticket> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, id: TicketId) -> Option<Ticket> {
        let slot = self.slots.get_mut(id.0 as usize)?;
        let ticket = slot.take()?;
        self.free.push(id.0);
        Some(ticket)
    }

    /// Discard every ticket, releasing all slots back to the free list.
    /// Used by the reconfiguration coordinator's v0 rebuild strategy.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (TicketId, &Ticket)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|t| (TicketId(i as u32), t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_remove_round_trip() {
        let mut arena = TicketArena::with_capacity(4);
        let id = arena.insert(Ticket::new(0, DomainId(1))).unwrap();
        assert_eq!(arena.len(), 1);
        assert!(arena.get(id).is_some());

        let removed = arena.remove(id).unwrap();
        assert_eq!(removed.domain, DomainId(1));
        assert_eq!(arena.len(), 0);
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut arena = TicketArena::with_capacity(1);
        let id1 = arena.insert(Ticket::new(0, DomainId(1))).unwrap();
        arena.remove(id1).unwrap();
        let id2 = arena.insert(Ticket::new(1, DomainId(2))).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn capacity_exhaustion_returns_ticket_back() {
        let mut arena = TicketArena::with_capacity(1);
        arena.insert(Ticket::new(0, DomainId(1))).unwrap();
        let overflow = arena.insert(Ticket::new(1, DomainId(2)));
        assert!(overflow.is_err());
    }

    #[test]
    fn new_ticket_defaults_to_waiting_location() {
        let t = Ticket::new(0, DomainId(1));
        assert_eq!(t.location, Location::Waiting);
        assert!(t.is_permanent_remaining());
    }
}
