// cohort-sched: pool (the whole gang scheduler instance)
// Ties the domain table, topology, per-pCPU local schedulers, boot
// parameters, and the shared current-ticket publication array together.
// One `Pool` per hypervisor instance; never a global static, so tests can
// run several pools side by side.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::{Domain, DomainId, DomainTable};
use crate::host::Host;
use crate::local::LocalScheduler;
use crate::topology::Topology;
use crate::{config::BootParams, ticket::TicketId};

/// A pCPU's best-effort-rank-agnostic view of what is currently running
/// there, published by dispatch for every pCPU in the winning domain's
/// mask (see SPEC_FULL.md's resolution of the cross-pCPU visibility
/// question). Purely observational: no local scheduler reads this to make
/// a dispatch decision, only tests and diagnostics do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentAssignment {
    pub domain: DomainId,
    pub ticket: TicketId,
    pub activated_at: u64,
}

pub struct Pool {
    pub host: Arc<dyn Host>,
    pub boot: BootParams,
    pub domains: DomainTable,
    pub topology: Topology,
    pub locals: Vec<LocalScheduler>,
    pub current_ticket: Vec<RwLock<Option<CurrentAssignment>>>,
    reconfig_in_progress: AtomicBool,
}

impl Pool {
    pub fn new(host: Arc<dyn Host>, boot: BootParams) -> Self {
        let pool_size = boot.pool_size;
        let locals = (0..pool_size)
            .map(|p| LocalScheduler::new(p, boot.arena_capacity_per_pcpu))
            .collect();
        let current_ticket = (0..pool_size).map(|_| RwLock::new(None)).collect();
        Pool {
            host,
            boot,
            domains: DomainTable::new(),
            topology: Topology {
                pcpu_to_cohort: vec![u32::MAX; pool_size],
                cohort_mask: Vec::new(),
                be_doms_in_cohort: Vec::new(),
                domain_cohort: Vec::new(),
            },
            locals,
            current_ticket,
            reconfig_in_progress: AtomicBool::new(false),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.boot.pool_size
    }

    pub fn try_begin_reconfig(&self) -> bool {
        self.reconfig_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn end_reconfig(&self) {
        self.reconfig_in_progress.store(false, Ordering::Release);
    }

    /// Publish `assignment` into every pCPU in `mask`'s current-ticket
    /// slot. Idempotent: every pCPU in a winning domain's mask converges
    /// on the same `(domain, activated_at)` pair by construction, so
    /// concurrent publications from cohort-mates never conflict.
    pub fn publish_current(&self, mask: crate::mask::CpuMask, assignment: CurrentAssignment) {
        for pcpu in mask.iter() {
            if let Some(slot) = self.current_ticket.get(pcpu) {
                *slot.write() = Some(assignment);
            }
        }
    }

    pub fn domain(&self, id: DomainId) -> Option<&Domain> {
        self.domains.get(id)
    }

    /// Snapshot of every pCPU's published current assignment, for
    /// round-trip/idempotence property tests (SPEC_FULL.md's supplemental
    /// test helper).
    pub fn snapshot(&self) -> Vec<Option<CurrentAssignment>> {
        self.current_ticket.iter().map(|s| *s.read()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::LocalHost;

    #[test]
    fn new_pool_has_no_cohorts_and_empty_current_ticket() {
        let host = Arc::new(LocalHost::new(4));
        let pool = Pool::new(host, BootParams::from_env(4));
        assert_eq!(pool.locals.len(), 4);
        assert_eq!(pool.snapshot(), vec![None, None, None, None]);
    }

    #[test]
    fn reconfig_guard_is_exclusive() {
        let host = Arc::new(LocalHost::new(2));
        let pool = Pool::new(host, BootParams::from_env(2));
        assert!(pool.try_begin_reconfig());
        assert!(!pool.try_begin_reconfig());
        pool.end_reconfig();
        assert!(pool.try_begin_reconfig());
    }

    #[test]
    fn publish_current_reaches_every_masked_pcpu() {
        let host = Arc::new(LocalHost::new(4));
        let pool = Pool::new(host, BootParams::from_env(4));
        let assignment = CurrentAssignment {
            domain: DomainId(1),
            ticket: TicketId(0),
            activated_at: 100,
        };
        pool.publish_current(crate::mask::CpuMask::from_bits(0b0101), assignment);
        let snap = pool.snapshot();
        assert_eq!(snap[0], Some(assignment));
        assert_eq!(snap[1], None);
        assert_eq!(snap[2], Some(assignment));
    }
}
