// cohort-sched: host abstraction (K)
// The scheduling core never talks to spinlocks, IPIs, or softirqs
// directly — it goes through this trait, so the hot path and the
// reconfiguration coordinator are both testable on a single thread.

use parking_lot::{Mutex, RwLock};

use crate::mask::CpuMask;

/// Hypervisor services the scheduling core needs but does not implement
/// itself: cross-pCPU execution, a reconfiguration-wide barrier, and a
/// monotonic clock. Implemented once per target (bare-metal hypervisor
/// build) and once for tests (`LocalHost`).
pub trait Host: Send + Sync {
    /// Number of pCPUs in the pool this host manages.
    fn pool_size(&self) -> usize;

    /// Current time, nanoseconds, monotonic.
    fn now_ns(&self) -> u64;

    /// Run `f` on every pCPU in `mask`, blocking the caller until all have
    /// completed. Used by the reconfiguration coordinator's two barriers
    /// (spec §4.6): every participant must observe the same published
    /// topology before any of them resumes dispatch.
    fn run_on_each(&self, mask: CpuMask, f: &(dyn Fn(usize) + Sync));

    /// Request a softirq/deferred callback on `pcpu` at the next
    /// opportunity (used to wake a pCPU whose activation queue just
    /// gained an entry from cross-pCPU reconfiguration).
    fn notify(&self, pcpu: usize);
}

/// Single-process, multi-threaded-safe host for tests and the reference
/// userspace build. `run_on_each` executes synchronously on the calling
/// thread — sufficient for deterministic tests, since the two-barrier
/// protocol only requires that every participant observes the barrier
/// before any proceeds, not true hardware concurrency.
pub struct LocalHost {
    pool_size: usize,
    clock: Mutex<u64>,
    notified: RwLock<Vec<bool>>,
}

impl LocalHost {
    pub fn new(pool_size: usize) -> Self {
        LocalHost {
            pool_size,
            clock: Mutex::new(0),
            notified: RwLock::new(vec![false; pool_size]),
        }
    }

    /// Advance the test clock. `LocalHost` has no real timer; callers
    /// drive time forward explicitly.
    pub fn advance_clock(&self, delta_ns: u64) {
        *self.clock.lock() += delta_ns;
    }

    pub fn was_notified(&self, pcpu: usize) -> bool {
        self.notified.read().get(pcpu).copied().unwrap_or(false)
    }

    pub fn clear_notifications(&self) {
        self.notified.write().iter_mut().for_each(|b| *b = false);
    }
}

impl Host for LocalHost {
    fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn now_ns(&self) -> u64 {
        *self.clock.lock()
    }

    fn run_on_each(&self, mask: CpuMask, f: &(dyn Fn(usize) + Sync)) {
        for pcpu in mask.iter() {
            if pcpu < self.pool_size {
                f(pcpu);
            }
        }
    }

    fn notify(&self, pcpu: usize) {
        if let Some(slot) = self.notified.write().get_mut(pcpu) {
            *slot = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn run_on_each_visits_every_masked_pcpu_exactly_once() {
        let host = LocalHost::new(8);
        let count = AtomicUsize::new(0);
        host.run_on_each(CpuMask::from_bits(0b0101_0101), &|_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn clock_advances_monotonically() {
        let host = LocalHost::new(1);
        assert_eq!(host.now_ns(), 0);
        host.advance_clock(100);
        assert_eq!(host.now_ns(), 100);
    }

    #[test]
    fn notify_marks_target_pcpu_only() {
        let host = LocalHost::new(4);
        host.notify(2);
        assert!(host.was_notified(2));
        assert!(!host.was_notified(1));
    }
}
