// cohort-sched: nanosecond time helpers shared across the scheduling core
// All absolute and relative times in this crate are u64 nanoseconds.

/// Sentinel used for "never"/"unbounded" deadlines and remaining times
/// (permanent-policy tickets carry this in `deadline` and `remaining_time`).
pub const INFINITY: u64 = u64::MAX;

/// Tolerance for a dispatcher observing `now` slightly before a ticket's
/// `activated_at` (clock read ordering, not a real time-travel bug).
/// Corresponds to spec's MIN_NEGATIVE_DIFF (~-10us), stored as a magnitude.
pub const MIN_NEGATIVE_DIFF_NS: u64 = 10_000;

/// Threshold below which a dispatched ticket's remaining time is considered
/// exhausted and due for reinitialization (spec's MARGIN, ~10us).
pub const MARGIN_NS: u64 = 10_000;

/// Floor `value` to the nearest lower multiple of `grain`. `grain` of zero
/// is treated as "no flooring" to avoid a division by zero on misconfigured
/// input; callers validate `grain > 0` at the boundary instead.
#[inline]
pub fn floor_to_grain(value: u64, grain: u64) -> u64 {
    if grain == 0 {
        return value;
    }
    (value / grain) * grain
}

/// Ceiling of `value` to the nearest multiple of `grain`.
#[inline]
pub fn ceil_to_grain(value: u64, grain: u64) -> u64 {
    if grain == 0 {
        return value;
    }
    let rem = value % grain;
    if rem == 0 {
        value
    } else {
        value + (grain - rem)
    }
}

/// Smallest `v >= start` such that `v ≡ from (mod period)`.
///
/// Used to re-align a ticket's schedule after a reconfiguration resumes
/// at `will_resume_at`, per spec §4.6 footnote 1.
#[inline]
pub fn align(start: u64, from: u64, period: u64) -> u64 {
    if period == 0 {
        return start.max(from);
    }
    // phase = from mod period, compute smallest v >= start with v mod period == phase
    let phase = from % period;
    let start_phase = start % period;
    if start_phase <= phase {
        start + (phase - start_phase)
    } else {
        start + (period - (start_phase - phase))
    }
}

/// Saturating, clamped delta between `now` and a ticket's `activated_at`.
///
/// Returns `Err` when `now` trails `activated_at` by more than
/// [`MIN_NEGATIVE_DIFF_NS`], which spec treats as a fatal invariant
/// violation (clock moved backwards further than scheduling jitter
/// explains). Otherwise returns `max(0, now - activated_at)`.
#[inline]
pub fn clamped_delta(now: u64, activated_at: u64) -> Result<u64, ()> {
    if now >= activated_at {
        Ok(now - activated_at)
    } else {
        let backwards = activated_at - now;
        if backwards > MIN_NEGATIVE_DIFF_NS {
            Err(())
        } else {
            Ok(0)
        }
    }
}
