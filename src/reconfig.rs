// cohort-sched: reconfiguration coordinator (I)
// Implements PUT/GET (spec §4.6) as a two-barrier protocol: validate and
// admit every entry of a batch off the hot path, pause every affected pCPU,
// publish the new topology and domain table, rebuild tickets, then resume.
// `Host::run_on_each` stands in for the pause/resume IPI round-trips — it
// blocks the caller until every targeted pCPU has run the closure, which is
// exactly the barrier semantics the two phases need.

use std::collections::HashSet;

use crate::admission::check_table;
use crate::domain::Domain;
use crate::error::{GangSchedError, Result};
use crate::mask::CpuMask;
use crate::pool::Pool;
use crate::request::{GetRequest, GetResponse, PutEntryResponse, PutRequest, PutResponse};
use crate::ticket::Ticket;
use crate::topology;

/// Install or update a batch of domains' policy/mask, atomically. Runs the
/// full two-barrier protocol: every entry validates and the whole batch is
/// admission-checked before any pCPU is touched, so a rejected request
/// leaves the live schedule completely untouched.
pub fn put(pool: &mut Pool, req: PutRequest) -> Result<PutResponse> {
    if !pool.try_begin_reconfig() {
        return Err(GangSchedError::Busy);
    }
    let result = put_inner(pool, req);
    pool.end_reconfig();
    result
}

fn put_inner(pool: &mut Pool, req: PutRequest) -> Result<PutResponse> {
    if req.pool_id != pool.boot.pool_id {
        return Err(GangSchedError::Validation(format!(
            "request targets pool {}, this pool is {}",
            req.pool_id, pool.boot.pool_id
        )));
    }
    if req.entries.is_empty() || req.entries.len() > crate::request::MAX_DOMAINS {
        return Err(GangSchedError::Validation(format!(
            "num_dom_entries {} out of range 1..={}",
            req.entries.len(),
            crate::request::MAX_DOMAINS
        )));
    }

    // Step 1 (spec §4.6): validate every entry before touching anything —
    // no duplicate ids, #vCPUs(domain) = weight(mask), mask subset of the
    // pool's own mask, and per-variant policy validation.
    let mut seen_ids = HashSet::with_capacity(req.entries.len());
    let pool_mask = CpuMask::full(pool.pool_size());
    for entry in &req.entries {
        if !seen_ids.insert(entry.domain) {
            return Err(GangSchedError::Validation(format!(
                "duplicate domain id {:?} in PUT batch",
                entry.domain
            )));
        }
        if !entry.mask.is_subset_of(&pool_mask) {
            return Err(GangSchedError::Validation(format!(
                "domain {:?} mask {:?} is not a subset of the pool mask",
                entry.domain, entry.mask
            )));
        }
        if entry.mask.weight() != entry.max_vcpus {
            return Err(GangSchedError::Validation(format!(
                "domain {:?}: max_vcpus {} does not match mask weight {}",
                entry.domain,
                entry.max_vcpus,
                entry.mask.weight()
            )));
        }
        entry
            .policy
            .validate(pool.boot.grain_ns)
            .map_err(GangSchedError::Validation)?;
    }

    // Build the tentative domain table (existing domains plus every entry
    // in this batch, replacing any prior record for the same id) and
    // validate admission against it before touching anything live.
    let mut tentative = pool.domains.clone();
    for entry in &req.entries {
        tentative.insert(Domain::new(entry.domain, entry.mask, entry.policy));
    }

    let offending = check_table(&tentative.0, pool.pool_size(), pool.boot.be_reserve_fraction());
    if !offending.is_empty() {
        return Err(GangSchedError::Admission {
            offending_pcpus: offending,
            detail: "batch does not fit within pool utilisation".to_string(),
        });
    }

    let sorted = tentative.sorted();
    let new_topology = topology::compute(&sorted, pool.pool_size());

    // Barrier 1: pause every pCPU that the new topology touches, which is
    // the union of the old and new cohort masks for every entry (anything
    // outside that union is unaffected and keeps dispatching uninterrupted).
    let affected = new_topology
        .cohort_mask
        .iter()
        .fold(CpuMask::empty(), |acc, m| acc.union(m))
        .union(
            &pool
                .topology
                .cohort_mask
                .iter()
                .fold(CpuMask::empty(), |acc, m| acc.union(m)),
        );

    pool.host.run_on_each(affected, &|_pcpu| {
        // Pause: the real host implementation stops dispatch on this pCPU
        // here. LocalHost (tests) has nothing to pause since dispatch is
        // driven synchronously by the caller.
    });

    // Publish: swap in the new domain table and topology.
    pool.domains = tentative;
    pool.topology = new_topology;
    for &(id, cohort) in &pool.topology.domain_cohort {
        if let Some(d) = pool.domains.get_mut(id) {
            d.cohort = Some(cohort);
        }
    }

    // Spec §4.6: "will_resume_at = ceil(now + adjust_upper_bound, grain)" —
    // the clock reference every rebuilt ticket initializes from, giving
    // every paused pCPU the same resumption instant regardless of how long
    // its own barrier wait actually took.
    let now = pool.host.now_ns();
    let will_resume_at = crate::time::ceil_to_grain(
        now.saturating_add(pool.boot.adj_time_upper_bound_ns),
        pool.boot.grain_ns,
    );

    // Barrier 2: rebuild each affected pCPU's ticket set from scratch and
    // resume. Per spec §4.6: "allocate fresh tickets for every domain with
    // a vCPU on this pCPU."
    for pcpu in affected.iter() {
        let Some(local) = pool.locals.get_mut(pcpu) else { continue };
        let Some(cohort_id) = pool.topology.cohort_of_pcpu(pcpu) else { continue };

        local.arena.clear();
        local.edf = crate::queue::OrderedQueue::new();
        local.activation = crate::queue::OrderedQueue::new();
        local.waiting = crate::waiting::WaitingSet::new();
        local.current = None;

        let mut be_index = 0u32;
        for domain in pool.domains.sorted() {
            if domain.mask.contains(pcpu) {
                let dom_cohort = pool
                    .topology
                    .domain_cohort
                    .iter()
                    .find(|(id, _)| *id == domain.id)
                    .map(|(_, c)| *c);
                if dom_cohort != Some(cohort_id) {
                    continue;
                }
                let this_index = if domain.policy.is_best_effort() {
                    let idx = be_index;
                    be_index += 1;
                    idx
                } else {
                    0
                };
                let (est, deadline, remaining) = domain.policy.initialize(
                    will_resume_at,
                    pool.boot.be_period_ns,
                    pool.boot.be_quantum_ns,
                    this_index,
                );
                let mut ticket = Ticket::new(0, domain.id);
                ticket.earliest_start_time = est;
                ticket.deadline = deadline;
                ticket.remaining_time = remaining;
                let _ = local.insert(ticket).map(|id| local.requeue_activation(id));
            }
        }
    }

    pool.host.run_on_each(affected, &|_pcpu| {
        // Resume: the real host implementation restarts dispatch here.
    });

    let assignments = req
        .entries
        .iter()
        .map(|entry| {
            let cohort = pool
                .topology
                .domain_cohort
                .iter()
                .find(|(id, _)| *id == entry.domain)
                .map(|(_, c)| *c)
                .expect("just-inserted domain must have a cohort");
            PutEntryResponse {
                domain: entry.domain,
                cohort,
            }
        })
        .collect();

    Ok(PutResponse { assignments })
}

/// Read back a domain's live record. Never touches the topology and needs
/// no barrier — concurrent with dispatch and with other GETs.
pub fn get(pool: &Pool, req: GetRequest) -> Result<GetResponse> {
    let domain = pool
        .domain(req.domain)
        .ok_or_else(|| GangSchedError::Validation(format!("unknown domain {:?}", req.domain)))?;
    Ok(GetResponse {
        domain: domain.id,
        mask: domain.mask,
        policy: domain.policy,
        cohort: domain.cohort,
    })
}
