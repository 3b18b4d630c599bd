// cohort-sched: reconfiguration request/response records
// PUT atomically installs or updates one or more domains' policy/mask in a
// single pool; GET reads back one live record. Both cross the host boundary
// as plain serde records (spec §5/§6).

use serde::{Deserialize, Serialize};

use crate::domain::DomainId;
use crate::mask::CpuMask;
use crate::policy::Policy;

/// Upper bound on `entries.len()` for a single PUT, per spec §6
/// (`num_dom_entries (1..=MAX_DOMAINS)`).
pub const MAX_DOMAINS: usize = 256;

/// One domain's target configuration within a PUT batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutEntry {
    pub domain: DomainId,
    pub mask: CpuMask,
    pub policy: Policy,
    /// The domain's fixed vCPU count. Spec §4.6 step 1: "#vCPUs(domain) =
    /// max_vCPUs(domain) = weight(new mask)" — one vCPU per pCPU in a gang
    /// domain's mask, validated against this count before anything commits.
    pub max_vcpus: u32,
}

/// Atomically install or update every entry's policy/mask in one
/// reconfiguration pass (spec §6's PUT command). All entries validate and
/// admit together, or none of them take effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub pool_id: u32,
    pub entries: Vec<PutEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutEntryResponse {
    pub domain: DomainId,
    pub cohort: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutResponse {
    pub assignments: Vec<PutEntryResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub domain: DomainId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub domain: DomainId,
    pub mask: CpuMask,
    pub policy: Policy,
    pub cohort: Option<u32>,
}

// `CpuMask` crosses the serde boundary as its raw bit pattern; the type
// itself intentionally has no public constructor from arbitrary bits other
// than `from_bits`, which is exactly what round-tripping needs.
impl Serialize for CpuMask {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u128(self.bits())
    }
}

impl<'de> Deserialize<'de> for CpuMask {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u128::deserialize(deserializer)?;
        Ok(CpuMask::from_bits(bits))
    }
}
