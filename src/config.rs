// cohort-sched: boot configuration (L)
// Pool-wide parameters fixed at boot and only changeable by restarting the
// subsystem. Env-var overrides follow the `SCHED_GANG_*` convention spec §6
// names, mirroring `knhk-config`'s env-override convention for boot-time
// tunables.

use std::env;

use serde::{Deserialize, Serialize};

/// Minimum scheduling grain, nanoseconds. Clamped to a sane range since a
/// misconfigured grain (zero, or larger than any domain's active slice)
/// makes every policy's validation vacuous or impossible.
const MIN_GRAIN_NS: u64 = 100;
const MAX_GRAIN_NS: u64 = 10_000_000;
const DEFAULT_GRAIN_NS: u64 = 1_000;

const DEFAULT_BE_RESERVE_PERCENT: u8 = 10;

const DEFAULT_BE_PERIOD_NS: u64 = 100_000_000;

const MIN_ADJ_TIME_UPPER_BOUND_NS: u64 = 10_000_000; // 10ms
const MAX_ADJ_TIME_UPPER_BOUND_NS: u64 = 500_000_000; // 500ms
const DEFAULT_ADJ_TIME_UPPER_BOUND_NS: u64 = 100_000_000; // 100ms
/// If the derived half-value (the barrier spin timeout) would fall below
/// this, the upper bound itself is forced up to `FORCED_ADJ_TIME_UPPER_BOUND_NS`
/// so the timeout stays usable (spec §6).
const MIN_HALF_ADJ_TIME_UPPER_BOUND_NS: u64 = 1_000_000; // 1ms
const FORCED_ADJ_TIME_UPPER_BOUND_NS: u64 = 2_000_000; // 2ms

const DEFAULT_ARENA_CAPACITY_PER_PCPU: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootParams {
    /// Identifier of the pool these params boot, as named in a PUT/GET
    /// request's `pool_id` field (spec §6). Not an env-var tunable; set by
    /// the host when it constructs a `Pool`.
    pub pool_id: u32,
    /// Number of pCPUs in the pool.
    pub pool_size: usize,
    /// Minimum scheduling quantum, nanoseconds.
    pub grain_ns: u64,
    /// Pool-wide best-effort reserve, percent of a pCPU's time budget
    /// (`sched_gang_cpu_rsrv_4_be_doms`, 0..=100).
    pub be_reserve_percent: u8,
    /// Best-effort round-robin period, nanoseconds
    /// (`sched_gang_period_4_be_doms`).
    pub be_period_ns: u64,
    /// Best-effort per-domain quantum within a period, nanoseconds. Derived:
    /// `be_period_ns * be_reserve_percent / 100`.
    pub be_quantum_ns: u64,
    /// Upper bound on how long a reconfiguration's two-barrier commit is
    /// expected to take, nanoseconds (`sched_gang_adj_time_upper_bound`).
    /// Used both as the barrier spin timeout (half this value) and as the
    /// clock offset for `will_resume_at`.
    pub adj_time_upper_bound_ns: u64,
    /// Ticket arena capacity per pCPU (bounds concurrently-live vCPUs).
    pub arena_capacity_per_pcpu: usize,
}

impl BootParams {
    /// Build defaults for `pool_size` pCPUs, then apply any `SCHED_GANG_*`
    /// environment overrides, clamping each to its valid range rather than
    /// failing boot on an out-of-range value.
    pub fn from_env(pool_size: usize) -> Self {
        let grain_ns = env_u64("SCHED_GANG_GRAIN_NS")
            .map(|v| v.clamp(MIN_GRAIN_NS, MAX_GRAIN_NS))
            .unwrap_or(DEFAULT_GRAIN_NS);

        let be_reserve_percent = env_u64("SCHED_GANG_CPU_RSRV_4_BE_DOMS")
            .map(|v| v.min(100) as u8)
            .unwrap_or(DEFAULT_BE_RESERVE_PERCENT);

        let be_period_ns = env_u64("SCHED_GANG_PERIOD_4_BE_DOMS")
            .map(|v| v.max(100 * grain_ns))
            .unwrap_or(DEFAULT_BE_PERIOD_NS.max(100 * grain_ns));

        let mut adj_time_upper_bound_ns = env_u64("SCHED_GANG_ADJ_TIME_UPPER_BOUND")
            .map(|v| v.clamp(MIN_ADJ_TIME_UPPER_BOUND_NS, MAX_ADJ_TIME_UPPER_BOUND_NS))
            .unwrap_or(DEFAULT_ADJ_TIME_UPPER_BOUND_NS);
        if adj_time_upper_bound_ns / 2 < MIN_HALF_ADJ_TIME_UPPER_BOUND_NS {
            adj_time_upper_bound_ns = FORCED_ADJ_TIME_UPPER_BOUND_NS;
        }

        let arena_capacity_per_pcpu = env_usize("SCHED_GANG_ARENA_CAPACITY_PER_PCPU")
            .map(|v| v.max(1))
            .unwrap_or(DEFAULT_ARENA_CAPACITY_PER_PCPU);

        let be_quantum_ns = be_period_ns * be_reserve_percent as u64 / 100;

        let params = BootParams {
            pool_id: 0,
            pool_size,
            grain_ns,
            be_reserve_percent,
            be_period_ns,
            be_quantum_ns,
            adj_time_upper_bound_ns,
            arena_capacity_per_pcpu,
        };

        if let Err(e) = params.validate() {
            tracing::warn!(error = %e, "boot params failed validation after env overrides, falling back to defaults");
            return BootParams::defaults(pool_size);
        }
        params
    }

    pub fn defaults(pool_size: usize) -> Self {
        let be_quantum_ns = DEFAULT_BE_PERIOD_NS * DEFAULT_BE_RESERVE_PERCENT as u64 / 100;
        BootParams {
            pool_id: 0,
            pool_size,
            grain_ns: DEFAULT_GRAIN_NS,
            be_reserve_percent: DEFAULT_BE_RESERVE_PERCENT,
            be_period_ns: DEFAULT_BE_PERIOD_NS,
            be_quantum_ns,
            adj_time_upper_bound_ns: DEFAULT_ADJ_TIME_UPPER_BOUND_NS,
            arena_capacity_per_pcpu: DEFAULT_ARENA_CAPACITY_PER_PCPU,
        }
    }

    /// `be_reserve_percent` expressed as a `0.0..=1.0` fraction, as the
    /// admission validator's utilisation sums want it.
    pub fn be_reserve_fraction(&self) -> f64 {
        self.be_reserve_percent as f64 / 100.0
    }

    /// Barrier spin timeout: half of `adj_time_upper_bound_ns` (spec §4.6:
    /// "busy-wait up to (½ × upper bound)").
    pub fn barrier_timeout_ns(&self) -> u64 {
        self.adj_time_upper_bound_ns / 2
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 || self.pool_size > crate::mask::MAX_PCPUS {
            return Err(format!("pool_size {} out of range", self.pool_size));
        }
        if self.grain_ns == 0 {
            return Err("grain_ns must be nonzero".to_string());
        }
        if self.be_period_ns < 100 * self.grain_ns {
            return Err("be_period_ns must be at least 100 * grain_ns".to_string());
        }
        if !(MIN_ADJ_TIME_UPPER_BOUND_NS..=MAX_ADJ_TIME_UPPER_BOUND_NS)
            .contains(&self.adj_time_upper_bound_ns)
        {
            return Err("adj_time_upper_bound_ns out of range [10ms, 500ms]".to_string());
        }
        if self.be_quantum_ns > self.be_period_ns {
            return Err("be_quantum_ns must not exceed be_period_ns".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let params = BootParams::defaults(4);
        assert!(params.validate().is_ok());
        assert_eq!(params.be_quantum_ns, 10_000_000);
    }

    #[test]
    fn oversized_pool_size_fails_validation() {
        let mut params = BootParams::defaults(4);
        params.pool_size = crate::mask::MAX_PCPUS + 1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn quantum_exceeding_period_fails_validation() {
        let mut params = BootParams::defaults(1);
        params.be_period_ns = 100;
        params.be_quantum_ns = 200;
        assert!(params.validate().is_err());
    }

    #[test]
    fn adj_time_upper_bound_out_of_range_fails_validation() {
        let mut params = BootParams::defaults(1);
        params.adj_time_upper_bound_ns = 1_000_000; // 1ms, below the 10ms floor
        assert!(params.validate().is_err());
    }

    #[test]
    fn be_reserve_fraction_matches_percent() {
        let params = BootParams::defaults(1);
        assert_eq!(params.be_reserve_fraction(), 0.10);
    }
}
