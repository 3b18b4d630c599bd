// cohort-sched: cohort/mux-group topology engine (G)
// Computes the pCPU -> cohort partition from the full set of domain
// records, per spec §4.4. Recomputed only by the reconfiguration
// coordinator and published atomically between its two barriers.

use crate::domain::{Domain, DomainId};
use crate::mask::CpuMask;

#[derive(Debug, Clone)]
pub struct Topology {
    /// `pcpu -> cohort id`, for every pCPU in the pool.
    pub pcpu_to_cohort: Vec<u32>,
    /// `cohort id -> mask of pCPUs in that cohort`.
    pub cohort_mask: Vec<CpuMask>,
    /// `cohort id -> count of best-effort domains placed in that cohort`.
    pub be_doms_in_cohort: Vec<u32>,
    /// `domain id -> cohort id`, mirrors `Domain::cohort` for convenience.
    pub domain_cohort: Vec<(DomainId, u32)>,
}

impl Topology {
    pub fn cohort_of_pcpu(&self, pcpu: usize) -> Option<u32> {
        self.pcpu_to_cohort.get(pcpu).copied()
    }

    pub fn mask_of_cohort(&self, cohort: u32) -> CpuMask {
        self.cohort_mask
            .get(cohort as usize)
            .copied()
            .unwrap_or(CpuMask::EMPTY)
    }

    pub fn be_count(&self, cohort: u32) -> u32 {
        self.be_doms_in_cohort
            .get(cohort as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// Compute cohorts from `domains` (spec §4.4 steps 1-6). `pool_size` bounds
/// `pcpu_to_cohort`'s length; every pCPU outside any domain's mask is left
/// without a cohort assignment (absent from any cohort mask) — the
/// dispatcher never calls into a pCPU that isn't hosting any domain.
pub fn compute(domains: &[&Domain], pool_size: usize) -> Topology {
    // Step 1-3: build a list of disjoint cohort masks by inserting each
    // domain mask, merging on overlap, then closing the merge under
    // transitivity (a later insertion can bridge two previously disjoint
    // cohorts, per spec's "expansion in step 2 can introduce overlap").
    let mut cohorts: Vec<CpuMask> = Vec::new();

    for domain in domains {
        if domain.mask.is_empty() {
            continue;
        }
        let mut merged = domain.mask;
        let mut i = 0;
        while i < cohorts.len() {
            if cohorts[i].intersects(&merged) {
                merged = merged.union(&cohorts[i]);
                cohorts.remove(i);
            } else {
                i += 1;
            }
        }
        cohorts.push(merged);
    }

    // Post-pass closure: repeatedly merge any two cohorts that still
    // intersect. The loop above already merges against every existing
    // cohort per insertion, but a subsequent insertion can still cause two
    // already-placed cohorts to become linked through a third; run to a
    // fixed point defensively, exactly as spec describes.
    loop {
        let mut merged_any = false;
        'outer: for i in 0..cohorts.len() {
            for j in (i + 1)..cohorts.len() {
                if cohorts[i].intersects(&cohorts[j]) {
                    let m = cohorts[i].union(&cohorts[j]);
                    cohorts[i] = m;
                    cohorts.remove(j);
                    merged_any = true;
                    break 'outer;
                }
            }
        }
        if !merged_any {
            break;
        }
    }

    // Step 4: pcpu -> cohort id.
    let mut pcpu_to_cohort = vec![u32::MAX; pool_size];
    for (cohort_id, mask) in cohorts.iter().enumerate() {
        for pcpu in mask.iter() {
            if pcpu < pool_size {
                pcpu_to_cohort[pcpu] = cohort_id as u32;
            }
        }
    }

    // Step 5: domain -> cohort id. Absence is fatal per spec (a domain's
    // mask not fully contained in any computed cohort means the cohort
    // algorithm above is broken, since every domain mask was folded into
    // some cohort by construction).
    let mut domain_cohort = Vec::with_capacity(domains.len());
    for domain in domains {
        if domain.mask.is_empty() {
            continue;
        }
        let cohort_id = cohorts
            .iter()
            .position(|c| domain.mask.is_subset_of(c))
            .unwrap_or_else(|| {
                crate::error::halt_subsystem(crate::error::FatalInvariantViolation(format!(
                    "domain {:?} mask not contained in any cohort",
                    domain.id
                )))
            }) as u32;
        domain_cohort.push((domain.id, cohort_id));
    }

    // Step 6: best-effort counts per cohort.
    let mut be_doms_in_cohort = vec![0u32; cohorts.len()];
    for domain in domains {
        if domain.mask.is_empty() || !domain.policy.is_best_effort() {
            continue;
        }
        if let Some(&(_, cohort_id)) = domain_cohort.iter().find(|(id, _)| *id == domain.id) {
            be_doms_in_cohort[cohort_id as usize] += 1;
        }
    }

    Topology {
        pcpu_to_cohort,
        cohort_mask: cohorts,
        be_doms_in_cohort,
        domain_cohort,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;

    fn dom(id: i32, bits: u128) -> Domain {
        Domain::new(DomainId(id), CpuMask::from_bits(bits), Policy::Permanent { from_ns: 0 })
    }

    #[test]
    fn disjoint_masks_form_separate_cohorts() {
        let a = dom(1, 0b0000_1111); // c0..c3
        let b = dom(2, 0b1111_0000); // c4..c7
        let domains = vec![&a, &b];
        let topo = compute(&domains, 8);
        assert_eq!(topo.cohort_mask.len(), 2);
        assert_ne!(topo.cohort_of_pcpu(0), topo.cohort_of_pcpu(4));
    }

    #[test]
    fn overlapping_masks_force_a_single_cohort() {
        let a = dom(1, 0b0011); // c0,c1
        let b = dom(2, 0b0110); // c1,c2
        let domains = vec![&a, &b];
        let topo = compute(&domains, 4);
        assert_eq!(topo.cohort_mask.len(), 1);
        assert_eq!(topo.mask_of_cohort(0).weight(), 3);
    }

    #[test]
    fn disjoint_cohorts_end_to_end_scenario() {
        // spec §8 scenario 4: 40 pCPUs, several masks that must collapse
        // into exactly two cohorts: {5..14} and {15..39}.
        fn mask_range(lo: usize, hi: usize) -> CpuMask {
            let mut m = CpuMask::empty();
            for p in lo..=hi {
                m.set(p);
            }
            m
        }
        let domains_raw = vec![
            dom(1, mask_range(5, 14).bits()),
            dom(2, mask_range(20, 29).bits()),
            dom(3, mask_range(30, 39).bits()),
            dom(4, mask_range(15, 24).bits()),
            dom(5, mask_range(25, 34).bits()),
            dom(6, mask_range(15, 34).bits()),
            dom(7, mask_range(35, 39).bits()),
        ];
        let refs: Vec<&Domain> = domains_raw.iter().collect();
        let topo = compute(&refs, 40);

        assert_eq!(topo.cohort_mask.len(), 2);
        let cohort_a = topo.cohort_of_pcpu(5).unwrap();
        let cohort_b = topo.cohort_of_pcpu(15).unwrap();
        assert_ne!(cohort_a, cohort_b);
        for p in 5..=14 {
            assert_eq!(topo.cohort_of_pcpu(p), Some(cohort_a));
        }
        for p in 15..=39 {
            assert_eq!(topo.cohort_of_pcpu(p), Some(cohort_b));
        }
        assert_eq!(topo.mask_of_cohort(cohort_a).weight(), 10);
        assert_eq!(topo.mask_of_cohort(cohort_b).weight(), 25);
    }

    #[test]
    fn best_effort_counted_per_cohort() {
        let a = Domain::new(
            DomainId(1),
            CpuMask::from_bits(0b1111),
            Policy::BestEffort {
                from_ns: 0,
                weight: 1,
                space_fill: false,
            },
        );
        let b = Domain::new(
            DomainId(2),
            CpuMask::from_bits(0b1111),
            Policy::BestEffort {
                from_ns: 0,
                weight: 1,
                space_fill: false,
            },
        );
        let domains = vec![&a, &b];
        let topo = compute(&domains, 4);
        assert_eq!(topo.be_count(0), 2);
    }
}
