//! Gang scheduler core for a hypervisor that multiplexes guest domains
//! over pCPU cohorts.
//!
//! A [`pool::Pool`] owns a [`domain::DomainTable`], a [`topology::Topology`]
//! partitioning its pCPUs into disjoint cohorts, and one
//! [`local::LocalScheduler`] per pCPU. [`reconfig::put`]/[`reconfig::get`]
//! install and read back domain policies through a two-barrier protocol;
//! [`dispatch::dispatch_tick`] runs the steady-state per-tick scheduling
//! decision on a single pCPU.

pub mod admission;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod host;
pub mod local;
pub mod mask;
pub mod policy;
pub mod pool;
pub mod queue;
pub mod reconfig;
pub mod request;
pub mod ticket;
pub mod time;
pub mod topology;
pub mod waiting;

pub mod prelude {
    pub use crate::config::BootParams;
    pub use crate::domain::{Domain, DomainId};
    pub use crate::error::{GangSchedError, Result};
    pub use crate::host::{Host, LocalHost};
    pub use crate::mask::CpuMask;
    pub use crate::policy::Policy;
    pub use crate::pool::Pool;
    pub use crate::request::{
        GetRequest, GetResponse, PutEntry, PutEntryResponse, PutRequest, PutResponse, MAX_DOMAINS,
    };
}
