// cohort-sched: per-domain scheduling policy
// A closed tagged sum, matched at time-update sites rather than dispatched
// through a vtable, per the Design Notes' preference for a predictable,
// branch-friendly hot path.

use serde::{Deserialize, Serialize};

use crate::time::{align, floor_to_grain, INFINITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    /// Rejected at validation; a domain must carry a concrete policy.
    None,
    Permanent {
        from_ns: u64,
    },
    TimeTrig {
        from_ns: u64,
        period_ns: u64,
        active_ns: u64,
        space_fill: bool,
    },
    EventTrig {
        from_ns: u64,
        period_ns: u64,
        active_ns: u64,
        space_fill: bool,
    },
    BestEffort {
        from_ns: u64,
        weight: u16,
        space_fill: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Permanent,
    TimeTrig,
    EventTrig,
    BestEffort,
}

impl Policy {
    pub fn kind(&self) -> Option<PolicyKind> {
        match self {
            Policy::None => None,
            Policy::Permanent { .. } => Some(PolicyKind::Permanent),
            Policy::TimeTrig { .. } => Some(PolicyKind::TimeTrig),
            Policy::EventTrig { .. } => Some(PolicyKind::EventTrig),
            Policy::BestEffort { .. } => Some(PolicyKind::BestEffort),
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Policy::Permanent { .. })
    }

    pub fn is_best_effort(&self) -> bool {
        matches!(self, Policy::BestEffort { .. })
    }

    pub fn space_fill(&self) -> bool {
        match self {
            Policy::None | Policy::Permanent { .. } => false,
            Policy::TimeTrig { space_fill, .. }
            | Policy::EventTrig { space_fill, .. }
            | Policy::BestEffort { space_fill, .. } => *space_fill,
        }
    }

    /// Validate per-variant bounds from spec §6. `grain` is the minimum
    /// scheduling quantum; TimeTrig/EventTrig require `grain <= active <
    /// period < INFINITY`.
    pub fn validate(&self, grain: u64) -> Result<(), String> {
        match self {
            Policy::None => Err("policy None is not admissible".to_string()),
            Policy::Permanent { .. } => Ok(()),
            Policy::TimeTrig {
                period_ns,
                active_ns,
                ..
            }
            | Policy::EventTrig {
                period_ns,
                active_ns,
                ..
            } => {
                if *period_ns >= INFINITY {
                    return Err("period must be finite".to_string());
                }
                if !(grain <= *active_ns && *active_ns < *period_ns) {
                    return Err(format!(
                        "require grain({grain}) <= active({active_ns}) < period({period_ns})"
                    ));
                }
                Ok(())
            }
            Policy::BestEffort { weight, .. } => {
                if *weight == 0 {
                    return Err("best-effort weight must be in 1..=65535".to_string());
                }
                Ok(())
            }
        }
    }

    /// Per-pCPU utilisation contribution used by the admission validator
    /// (spec §4.7). `be_reserve_fraction` is the pool-wide best-effort
    /// reserve (e.g. 0.10 for a 10% reserve), already counted at most once
    /// per pCPU by the caller.
    /// Steady-state re-initialisation applied by `advance` once a
    /// dispatched ticket's `remaining_time` drops below `MARGIN` (spec
    /// §4.5's time-update table). `ticket_est`/`ticket_deadline` are the
    /// ticket's current values; `be_count_in_cohort` is the cohort's total
    /// best-effort domain count (spec's `be_count[k]`, `k` = cohort id).
    /// Returns `(earliest_start_time, deadline, remaining_time)`.
    #[allow(clippy::too_many_arguments)]
    pub fn retire(
        &self,
        ticket_est: u64,
        ticket_deadline: u64,
        now: u64,
        grain: u64,
        be_period_ns: u64,
        be_quantum_ns: u64,
        be_count_in_cohort: u32,
    ) -> (u64, u64, u64) {
        match self {
            Policy::None | Policy::Permanent { .. } => (ticket_est, ticket_deadline, INFINITY),
            Policy::TimeTrig {
                period_ns,
                active_ns,
                ..
            } => (ticket_est + period_ns, ticket_deadline + period_ns, *active_ns),
            Policy::EventTrig {
                period_ns,
                active_ns,
                ..
            } => (
                floor_to_grain(now, grain),
                ticket_deadline + period_ns,
                *active_ns,
            ),
            Policy::BestEffort { .. } => (
                floor_to_grain(now, grain),
                ticket_deadline + (be_count_in_cohort as u64) * be_period_ns,
                be_quantum_ns,
            ),
        }
    }

    /// Initial ticket values assigned during a reconfiguration's per-pCPU
    /// rebuild (spec §4.6's ticket-initialisation table), using
    /// `will_resume_at` as the clock reference. `be_index` is this
    /// domain's rank (0-based) among best-effort domains in its cohort,
    /// used to stagger best-effort deadlines across the best-effort
    /// period so they do not all compete for the very first slot at once.
    pub fn initialize(
        &self,
        will_resume_at: u64,
        be_period_ns: u64,
        be_quantum_ns: u64,
        be_index: u32,
    ) -> (u64, u64, u64) {
        match self {
            Policy::None => (will_resume_at, INFINITY, INFINITY),
            Policy::Permanent { from_ns } => {
                let est = (*from_ns).max(will_resume_at);
                (est, INFINITY, INFINITY)
            }
            Policy::TimeTrig {
                from_ns,
                period_ns,
                active_ns,
                ..
            }
            | Policy::EventTrig {
                from_ns,
                period_ns,
                active_ns,
                ..
            } => {
                let est = align(will_resume_at, *from_ns, *period_ns);
                (est, est + period_ns, *active_ns)
            }
            Policy::BestEffort { from_ns, .. } => {
                let est = align(will_resume_at, *from_ns, be_period_ns);
                (
                    est,
                    est + (be_index as u64) * be_period_ns,
                    be_quantum_ns,
                )
            }
        }
    }

    pub fn utilisation(&self) -> Utilisation {
        match self {
            Policy::None => Utilisation::Zero,
            Policy::Permanent { .. } => Utilisation::Full,
            Policy::TimeTrig {
                period_ns,
                active_ns,
                ..
            }
            | Policy::EventTrig {
                period_ns,
                active_ns,
                ..
            } => Utilisation::Fraction(*active_ns as f64 / *period_ns as f64),
            Policy::BestEffort { .. } => Utilisation::BestEffort,
        }
    }
}

/// Per-domain utilisation contribution, kept distinct from a raw `f64` so
/// the admission validator can special-case `Full` (permanent exclusivity)
/// and `BestEffort` (counted once per pCPU regardless of domain count).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Utilisation {
    Zero,
    Full,
    Fraction(f64),
    BestEffort,
}

impl Default for Policy {
    fn default() -> Self {
        Policy::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAIN: u64 = 1_000;

    #[test]
    fn time_trig_bounds_enforced() {
        let ok = Policy::TimeTrig {
            from_ns: 0,
            period_ns: 100_000,
            active_ns: 50_000,
            space_fill: false,
        };
        assert!(ok.validate(GRAIN).is_ok());

        let active_equals_period = Policy::TimeTrig {
            from_ns: 0,
            period_ns: 100_000,
            active_ns: 100_000,
            space_fill: false,
        };
        assert!(active_equals_period.validate(GRAIN).is_err());

        let active_below_grain = Policy::TimeTrig {
            from_ns: 0,
            period_ns: 100_000,
            active_ns: 500,
            space_fill: false,
        };
        assert!(active_below_grain.validate(GRAIN).is_err());
    }

    #[test]
    fn boundary_active_equals_grain_is_ok() {
        let p = Policy::TimeTrig {
            from_ns: 0,
            period_ns: 100_000,
            active_ns: GRAIN,
            space_fill: false,
        };
        assert!(p.validate(GRAIN).is_ok());
    }

    #[test]
    fn boundary_active_equals_period_minus_grain_is_ok() {
        let p = Policy::TimeTrig {
            from_ns: 0,
            period_ns: 100_000,
            active_ns: 100_000 - GRAIN,
            space_fill: false,
        };
        assert!(p.validate(GRAIN).is_ok());
    }

    #[test]
    fn none_policy_rejected() {
        assert!(Policy::None.validate(GRAIN).is_err());
    }

    #[test]
    fn best_effort_requires_nonzero_weight() {
        let p = Policy::BestEffort {
            from_ns: 0,
            weight: 0,
            space_fill: false,
        };
        assert!(p.validate(GRAIN).is_err());
    }

    #[test]
    fn utilisation_matches_policy_kind() {
        assert_eq!(Policy::Permanent { from_ns: 0 }.utilisation(), Utilisation::Full);
        let tt = Policy::TimeTrig {
            from_ns: 0,
            period_ns: 200,
            active_ns: 50,
            space_fill: false,
        };
        assert_eq!(tt.utilisation(), Utilisation::Fraction(0.25));
    }

    #[test]
    fn permanent_retire_never_changes_remaining() {
        let p = Policy::Permanent { from_ns: 0 };
        let (est, deadline, remaining) = p.retire(10, INFINITY, 1_000, GRAIN, 0, 0, 0);
        assert_eq!(est, 10);
        assert_eq!(deadline, INFINITY);
        assert_eq!(remaining, INFINITY);
    }

    #[test]
    fn time_trig_retire_advances_by_period() {
        let p = Policy::TimeTrig {
            from_ns: 0,
            period_ns: 100,
            active_ns: 40,
            space_fill: false,
        };
        let (est, deadline, remaining) = p.retire(200, 300, 250, GRAIN, 0, 0, 0);
        assert_eq!(est, 300);
        assert_eq!(deadline, 400);
        assert_eq!(remaining, 40);
    }

    #[test]
    fn best_effort_initialize_staggers_by_index() {
        let p = Policy::BestEffort {
            from_ns: 0,
            weight: 1,
            space_fill: false,
        };
        let (est0, deadline0, remaining0) = p.initialize(1000, 500, 50, 0);
        let (est1, deadline1, _) = p.initialize(1000, 500, 50, 1);
        assert_eq!(est0, est1); // same est, staggered only in deadline
        assert_eq!(deadline1 - deadline0, 500);
        assert_eq!(remaining0, 50);
    }

    #[test]
    fn permanent_initialize_uses_max_of_from_and_resume() {
        let p = Policy::Permanent { from_ns: 5_000 };
        let (est, deadline, remaining) = p.initialize(1_000, 0, 0, 0);
        assert_eq!(est, 5_000);
        assert_eq!(deadline, INFINITY);
        assert_eq!(remaining, INFINITY);

        let (est2, _, _) = p.initialize(10_000, 0, 0, 0);
        assert_eq!(est2, 10_000);
    }
}
