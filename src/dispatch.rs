// cohort-sched: per-tick dispatcher (H)
// Runs the seven-step protocol of spec §4.5 on a single pCPU: advance
// clocks, drain the EDF queue assigning non-conflicting domains and
// reinserting conflicting ones, resolve space-fill substitution, and
// publish the winning ticket into the cohort's shared current_ticket slot.

use rustc_hash::FxHashMap;

use crate::domain::{Domain, DomainId};
use crate::local::LocalScheduler;
use crate::mask::CpuMask;
use crate::pool::{CurrentAssignment, Pool};
use crate::ticket::{TicketFlags, TicketId};
use crate::time::INFINITY;

/// Outcome of one dispatch call on one pCPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    pub ticket: Option<TicketId>,
    pub domain: Option<DomainId>,
    /// Absolute time this slice ends, floored to the scheduling grain.
    /// Bounded by the dispatched ticket's `remaining_time`, the earliest
    /// reinserted-ticket deadline, and the next queued activation (spec
    /// §4.5 steps 3-4 / invariant 7).
    pub slice_end: u64,
}

impl DispatchResult {
    pub const IDLE: DispatchResult = DispatchResult {
        ticket: None,
        domain: None,
        slice_end: INFINITY,
    };
}

/// Run one dispatch tick on `local`. `domains` resolves a domain id to its
/// current record (mask/policy), as needed by `advance`'s retire table and
/// by the permanent-exclusivity check. `be_period_ns`/`be_quantum_ns`/
/// `be_count_in_cohort`/`grain` are this pCPU's cohort-scoped boot params.
#[allow(clippy::too_many_arguments)]
pub fn dispatch_tick(
    local: &mut LocalScheduler,
    now: u64,
    grain: u64,
    be_period_ns: u64,
    be_quantum_ns: u64,
    be_count_in_cohort: u32,
    domains: &FxHashMap<DomainId, Domain>,
) -> DispatchResult {
    // Step 1: advance clocks — retire the outgoing dispatched ticket (if
    // any) and migrate any now-ready activation-queue tickets into EDF.
    let next_activation = local.advance(
        now,
        grain,
        be_period_ns,
        be_quantum_ns,
        be_count_in_cohort,
        |id| domains.get(&id).cloned(),
    );

    // Steps 2-3: drain the EDF queue in deadline order, maintaining
    // `assigned_pcpus`. The first ticket whose domain mask doesn't
    // intersect it wins this pCPU; every other ticket necessarily shares
    // this pCPU with the winner (that's why it's in this local queue), so
    // it's reinserted into the activation queue with its existing times
    // rather than left dangling in the EDF queue.
    let mut assigned_pcpus = CpuMask::empty();
    let mut winner: Option<TicketId> = None;
    let mut winner_domain: Option<DomainId> = None;
    let mut conflict_bound = INFINITY;

    while let Some(t) = local.edf.pop_min() {
        let (domain_id, deadline, remaining) = {
            let tk = local
                .arena
                .get(t)
                .expect("ticket popped from EDF queue must exist in the arena");
            (tk.domain, tk.deadline, tk.remaining_time)
        };
        let domain_mask = domains.get(&domain_id).map(|d| d.mask).unwrap_or(CpuMask::empty());

        if winner.is_none() && !domain_mask.intersects(&assigned_pcpus) {
            assigned_pcpus = assigned_pcpus.union(&domain_mask);
            winner = Some(t);
            winner_domain = Some(domain_id);
        } else {
            local.requeue_activation(t);
            let contribution = if remaining >= deadline {
                now.saturating_add(1)
            } else {
                (deadline - remaining).max(now.saturating_add(1))
            };
            conflict_bound = conflict_bound.min(contribution);
        }
    }

    let Some(winner) = winner else {
        return DispatchResult {
            ticket: None,
            domain: None,
            slice_end: floor_slice(next_activation, grain),
        };
    };
    let winner_domain = winner_domain.expect("winner ticket always carries its domain id");

    // Step 6 (clear-yield-bit) applies regardless of which branch below is
    // taken, so do it once up front.
    if let Some(tk) = local.arena.get_mut(winner) {
        tk.flags.remove(TicketFlags::SINGLE_VCPU_YIELD);
    }

    let is_permanent = domains
        .get(&winner_domain)
        .map(|d| d.policy.is_permanent())
        .unwrap_or(false);

    // Step 5: a winner willing to yield (single-vCPU-yield flag, non-
    // permanent) hands its slice to a sleeping space-fill-eligible
    // substitute if one exists; with none available the pCPU goes idle
    // rather than running the winner anyway.
    let final_ticket = if !is_permanent && winner_flagged_yield(local, winner) {
        let substitute = find_space_fill_substitute(local, domains);
        local.requeue_edf(winner);
        match substitute {
            Some(sub) => {
                if let Some(tk) = local.arena.get_mut(sub) {
                    tk.on_my_behalf = Some(winner);
                }
                Some(sub)
            }
            None => None,
        }
    } else {
        Some(winner)
    };

    let final_domain = final_ticket.and_then(|ft| {
        if ft == winner {
            Some(winner_domain)
        } else {
            local.arena.get(ft).map(|t| t.domain)
        }
    });

    // Step 3 (assigned branch) / invariant 7: the slice bound is derived
    // from the dispatched ticket's own remaining budget, not its deadline —
    // a TimeTrig/BestEffort ticket must never run past what it has left.
    let dispatched_bound = match final_ticket {
        Some(ft) => {
            let remaining = local.arena.get(ft).map(|t| t.remaining_time).unwrap_or(INFINITY);
            if remaining == INFINITY {
                INFINITY
            } else {
                now.saturating_add(remaining)
            }
        }
        None => INFINITY,
    };

    if let Some(ft) = final_ticket {
        if let Some(tk) = local.arena.get_mut(ft) {
            tk.location = crate::ticket::Location::Dispatched;
            tk.activated_at = now;
        }
        local.current = Some(ft);
    } else {
        local.current = None;
    }

    // Step 4: fold in the next queued activation, then floor to grain.
    let raw_slice_end = dispatched_bound.min(conflict_bound).min(next_activation);
    let slice_end = floor_slice(raw_slice_end, grain).max(now);

    DispatchResult {
        ticket: final_ticket,
        domain: final_domain,
        slice_end,
    }
}

/// Run `dispatch_tick` for `pcpu` and publish the winning domain's mask
/// into every pCPU's `current_ticket` slot (spec §4.5 step 3: "for every
/// pCPU in D.mask, set current_ticket[pCPU] = T"), realizing the gang
/// property across the whole cohort, not just the local pCPU.
pub fn dispatch(pool: &mut Pool, pcpu: usize, now: u64) -> DispatchResult {
    let cohort_id = pool.topology.cohort_of_pcpu(pcpu);
    let be_count = cohort_id.map(|c| pool.topology.be_count(c)).unwrap_or(0);
    let grain = pool.boot.grain_ns;
    let be_period_ns = pool.boot.be_period_ns;
    let be_quantum_ns = pool.boot.be_quantum_ns;

    let result = {
        let local = pool
            .locals
            .get_mut(pcpu)
            .unwrap_or_else(|| panic!("pcpu {pcpu} out of range"));
        let domains = &pool.domains.0;
        dispatch_tick(local, now, grain, be_period_ns, be_quantum_ns, be_count, domains)
    };

    if let (Some(ticket), Some(domain_id)) = (result.ticket, result.domain) {
        if let Some(domain) = pool.domains.get(domain_id) {
            pool.publish_current(
                domain.mask,
                CurrentAssignment {
                    domain: domain_id,
                    ticket,
                    activated_at: now,
                },
            );
        }
    }

    result
}

fn floor_slice(value: u64, grain: u64) -> u64 {
    if value == INFINITY {
        INFINITY
    } else {
        crate::time::floor_to_grain(value, grain)
    }
}

fn winner_flagged_yield(local: &LocalScheduler, ticket: TicketId) -> bool {
    local
        .arena
        .get(ticket)
        .map(|t| t.flags.contains(TicketFlags::SINGLE_VCPU_YIELD))
        .unwrap_or(false)
}

/// Search the waiting set for a sleeping best-effort ticket whose domain
/// opts into space-fill substitution (spec §4.5 steps 4-5). O(n) over the
/// waiting set; acceptable off the steady-state hot path since it only
/// triggers on an explicit yield.
fn find_space_fill_substitute(
    local: &LocalScheduler,
    domains: &FxHashMap<DomainId, Domain>,
) -> Option<TicketId> {
    for (ticket_id, ticket) in local.arena.iter() {
        if ticket.location != crate::ticket::Location::Waiting {
            continue;
        }
        if !ticket.flags.contains(TicketFlags::SLEEPING) {
            continue;
        }
        let eligible = domains
            .get(&ticket.domain)
            .map(|d| d.policy.space_fill())
            .unwrap_or(false);
        if eligible {
            return Some(ticket_id);
        }
    }
    None
}
