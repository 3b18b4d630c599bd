// cohort-sched: error taxonomy
// Mirrors spec §7: validation/admission/resource errors fail the request
// cleanly; timing degradation is logged and does not roll back; fatal
// invariant violations halt the subsystem.

use thiserror::Error;

/// Host-surfaced error codes, per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Caller is not outside the managed pool.
    EPerm,
    /// A reconfiguration is already in progress.
    EBusy,
    /// Request failed validation or admission.
    EInval,
    /// Allocator/arena exhausted during reconfiguration.
    ENoMem,
    /// Host-level I/O or cross-CPU call failure.
    EFault,
}

#[derive(Debug, Error)]
pub enum GangSchedError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("admission failed: utilisation exceeds 1.0 on pcpu(s) {offending_pcpus:?}")]
    Admission {
        offending_pcpus: Vec<usize>,
        detail: String,
    },

    #[error("resource exhausted: {0}")]
    Resource(String),

    #[error("caller is not outside the managed pool")]
    WrongCallerContext,

    #[error("a reconfiguration is already in progress")]
    Busy,

    #[error("host cross-cpu call failed: {0}")]
    HostFault(String),
}

impl GangSchedError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GangSchedError::Validation(_) => ErrorCode::EInval,
            GangSchedError::Admission { .. } => ErrorCode::EInval,
            GangSchedError::Resource(_) => ErrorCode::ENoMem,
            GangSchedError::WrongCallerContext => ErrorCode::EPerm,
            GangSchedError::Busy => ErrorCode::EBusy,
            GangSchedError::HostFault(_) => ErrorCode::EFault,
        }
    }
}

/// A fatal invariant violation: ticket located in none/multiple containers,
/// clock skew beyond tolerance, or a permanent domain sharing a cohort with
/// another dispatched ticket. Per spec §7 these indicate bugs, not user
/// errors, and halt the subsystem rather than return a `Result`.
#[derive(Debug, Error)]
#[error("fatal invariant violation: {0}")]
pub struct FatalInvariantViolation(pub String);

/// Log and abort on a fatal invariant violation. Centralized so every call
/// site produces the same structured diagnostic before unwinding.
#[track_caller]
pub fn halt_subsystem(violation: FatalInvariantViolation) -> ! {
    tracing::error!(
        location = %std::panic::Location::caller(),
        "{}",
        violation
    );
    panic!("{violation}");
}

pub type Result<T> = std::result::Result<T, GangSchedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_as_specified() {
        assert_eq!(GangSchedError::Busy.code(), ErrorCode::EBusy);
        assert_eq!(GangSchedError::WrongCallerContext.code(), ErrorCode::EPerm);
        assert_eq!(
            GangSchedError::Validation("bad".into()).code(),
            ErrorCode::EInval
        );
        assert_eq!(
            GangSchedError::Resource("oom".into()).code(),
            ErrorCode::ENoMem
        );
    }

    #[test]
    #[should_panic(expected = "fatal invariant violation")]
    fn halt_subsystem_panics() {
        halt_subsystem(FatalInvariantViolation("test".into()));
    }
}
