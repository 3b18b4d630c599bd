// cohort-sched: per-pCPU local scheduler (F)
// Owns the EDF queue (C), activation queue (D), waiting set (E), and this
// pCPU's own dispatched-ticket slot. Ticket queue-membership transitions
// are driven only by these methods (spec §3 "Lifecycle").

use crate::domain::{Domain, DomainId};
use crate::error::{halt_subsystem, FatalInvariantViolation};
use crate::queue::OrderedQueue;
use crate::ticket::{Location, Ticket, TicketArena, TicketId};
use crate::waiting::WaitingSet;

pub struct LocalScheduler {
    pub pcpu: usize,
    pub arena: TicketArena,
    pub edf: OrderedQueue,
    pub activation: OrderedQueue,
    pub waiting: WaitingSet,
    /// This pCPU's own currently-dispatched ticket, if any.
    pub current: Option<TicketId>,
}

impl LocalScheduler {
    pub fn new(pcpu: usize, arena_capacity: usize) -> Self {
        LocalScheduler {
            pcpu,
            arena: TicketArena::with_capacity(arena_capacity),
            edf: OrderedQueue::new(),
            activation: OrderedQueue::new(),
            waiting: WaitingSet::new(),
            current: None,
        }
    }

    /// Place a newly allocated ticket. Spec §4.3: "into E by default on
    /// pool join."
    pub fn insert(&mut self, mut ticket: Ticket) -> Result<TicketId, Ticket> {
        ticket.location = Location::Waiting;
        let domain = ticket.domain;
        let id = self.arena.insert(ticket)?;
        self.waiting.insert(domain, id);
        Ok(id)
    }

    /// Locate `ticket` in the EDF queue, activation queue, or waiting set
    /// (exactly one, per invariant 4 of spec §8) and excise it. Fatal if
    /// found nowhere, or if dispatched (cannot be removed mid-slice).
    pub fn remove(&mut self, ticket: TicketId) {
        let location = match self.arena.get(ticket) {
            Some(t) => t.location,
            None => halt_subsystem(FatalInvariantViolation(format!(
                "remove: ticket {:?} not present in arena",
                ticket
            ))),
        };
        match location {
            Location::Edf => {
                self.edf.remove(ticket);
            }
            Location::Activation => {
                self.activation.remove(ticket);
            }
            Location::Waiting => {
                self.waiting.remove_ticket(ticket);
            }
            Location::Dispatched => {
                if self.current == Some(ticket) {
                    self.current = None;
                }
            }
        }
        self.arena.remove(ticket);
    }

    /// Move a ticket from the waiting set into the activation queue (e.g.
    /// on an external event trigger, or transiently by reconfiguration).
    pub fn activate_from_waiting(&mut self, domain: DomainId) -> Option<TicketId> {
        let id = self.waiting.remove(domain)?;
        let ticket = self.arena.get_mut(id)?;
        ticket.location = Location::Activation;
        let est = ticket.earliest_start_time;
        self.activation.insert(est, domain, id);
        Some(id)
    }

    /// Reinsert a ticket into the EDF queue after updating its times,
    /// dropping it from wherever it currently sits first.
    pub fn requeue_edf(&mut self, ticket: TicketId) {
        self.remove_from_current_container(ticket);
        let (deadline, domain) = {
            let t = self
                .arena
                .get_mut(ticket)
                .unwrap_or_else(|| halt_subsystem(unknown_ticket(ticket)));
            t.location = Location::Edf;
            (t.deadline, t.domain)
        };
        self.edf.insert(deadline, domain, ticket);
    }

    pub fn requeue_activation(&mut self, ticket: TicketId) {
        self.remove_from_current_container(ticket);
        let (est, domain) = {
            let t = self
                .arena
                .get_mut(ticket)
                .unwrap_or_else(|| halt_subsystem(unknown_ticket(ticket)));
            t.location = Location::Activation;
            (t.earliest_start_time, t.domain)
        };
        self.activation.insert(est, domain, ticket);
    }

    pub fn requeue_waiting(&mut self, ticket: TicketId) {
        self.remove_from_current_container(ticket);
        let domain = {
            let t = self
                .arena
                .get_mut(ticket)
                .unwrap_or_else(|| halt_subsystem(unknown_ticket(ticket)));
            t.location = Location::Waiting;
            t.domain
        };
        self.waiting.insert(domain, ticket);
    }

    fn remove_from_current_container(&mut self, ticket: TicketId) {
        let location = self
            .arena
            .get(ticket)
            .unwrap_or_else(|| halt_subsystem(unknown_ticket(ticket)))
            .location;
        match location {
            Location::Edf => {
                self.edf.remove(ticket);
            }
            Location::Activation => {
                self.activation.remove(ticket);
            }
            Location::Waiting => {
                self.waiting.remove_ticket(ticket);
            }
            Location::Dispatched => {
                if self.current == Some(ticket) {
                    self.current = None;
                }
            }
        }
    }

    /// Advance clock state: update every dispatched ticket's times
    /// (spec §4.5's table), migrate activated tickets from the activation
    /// queue into the EDF queue, and return the earliest upcoming
    /// activation time (`INFINITY` if the activation queue is empty).
    ///
    /// `grain`/`be_period_ns`/`be_quantum_ns`/`be_count_in_cohort` are the
    /// boot/topology parameters needed by the per-policy retire table.
    pub fn advance(
        &mut self,
        now: u64,
        grain: u64,
        be_period_ns: u64,
        be_quantum_ns: u64,
        be_count_in_cohort: u32,
        domain_of: impl Fn(DomainId) -> Option<Domain>,
    ) -> u64 {
        if let Some(current) = self.current {
            self.retire_dispatched(
                current,
                now,
                grain,
                be_period_ns,
                be_quantum_ns,
                be_count_in_cohort,
                &domain_of,
            );
        }

        // Migrate activated tickets: every ticket in D whose
        // earliest_start_time <= now is runnable now.
        loop {
            let ready = match self.activation.peek_min_key() {
                Some(est) if est <= now => self.activation.pop_min(),
                _ => None,
            };
            let Some(ticket_id) = ready else { break };
            let (deadline, domain) = {
                let t = self
                    .arena
                    .get_mut(ticket_id)
                    .unwrap_or_else(|| halt_subsystem(unknown_ticket(ticket_id)));
                t.location = Location::Edf;
                (t.deadline, t.domain)
            };
            self.edf.insert(deadline, domain, ticket_id);
        }

        self.activation.peek_min_key().unwrap_or(crate::time::INFINITY)
    }

    fn retire_dispatched(
        &mut self,
        ticket_id: TicketId,
        now: u64,
        grain: u64,
        be_period_ns: u64,
        be_quantum_ns: u64,
        be_count_in_cohort: u32,
        domain_of: &impl Fn(DomainId) -> Option<Domain>,
    ) {
        let (activated_at, domain_id) = {
            let t = self
                .arena
                .get(ticket_id)
                .unwrap_or_else(|| halt_subsystem(unknown_ticket(ticket_id)));
            (t.activated_at, t.domain)
        };

        let delta = crate::time::clamped_delta(now, activated_at).unwrap_or_else(|_| {
            halt_subsystem(FatalInvariantViolation(format!(
                "ticket {:?}: now ({now}) precedes activated_at ({activated_at}) beyond tolerance",
                ticket_id
            )))
        });

        let domain = domain_of(domain_id).unwrap_or_else(|| {
            halt_subsystem(FatalInvariantViolation(format!(
                "ticket {:?}: domain {:?} not found",
                ticket_id, domain_id
            )))
        });

        let t = self
            .arena
            .get_mut(ticket_id)
            .unwrap_or_else(|| halt_subsystem(unknown_ticket(ticket_id)));
        t.remaining_time = t.remaining_time.saturating_sub(delta);

        if t.remaining_time < crate::time::MARGIN_NS && !domain.policy.is_permanent() {
            let (est, deadline, remaining) = domain.policy.retire(
                t.earliest_start_time,
                t.deadline,
                now,
                grain,
                be_period_ns,
                be_quantum_ns,
                be_count_in_cohort,
            );
            t.earliest_start_time = est;
            t.deadline = deadline;
            t.remaining_time = remaining;
            self.requeue_activation(ticket_id);
            self.current = None;
        }
    }
}

fn unknown_ticket(ticket: TicketId) -> FatalInvariantViolation {
    FatalInvariantViolation(format!("ticket {:?} missing from arena", ticket))
}
