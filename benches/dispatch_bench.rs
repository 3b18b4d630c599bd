// cohort-sched: dispatch hot path benchmarks

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rustc_hash::FxHashMap;

use cohort_sched::domain::{Domain, DomainId};
use cohort_sched::dispatch::dispatch_tick;
use cohort_sched::local::LocalScheduler;
use cohort_sched::mask::CpuMask;
use cohort_sched::policy::Policy;
use cohort_sched::ticket::Ticket;

fn time_trig_local(n_domains: u32) -> (LocalScheduler, FxHashMap<DomainId, Domain>) {
    let mut local = LocalScheduler::new(0, n_domains as usize + 1);
    let mut domains = FxHashMap::default();
    for i in 0..n_domains {
        let id = DomainId(i as i32);
        let domain = Domain::new(
            id,
            CpuMask::single(0),
            Policy::TimeTrig {
                from_ns: 0,
                period_ns: 1_000_000,
                active_ns: 10_000,
                space_fill: false,
            },
        );
        let mut ticket = Ticket::new(0, id);
        ticket.deadline = (i as u64 + 1) * 10_000;
        let tid = local.insert(ticket).unwrap();
        local.requeue_edf(tid);
        domains.insert(id, domain);
    }
    (local, domains)
}

fn bench_dispatch_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_tick");

    for n in [1u32, 4, 16, 64] {
        group.bench_with_input(BenchmarkId::new("edf_domains", n), &n, |b, &n| {
            b.iter_batched(
                || time_trig_local(n),
                |(mut local, domains)| {
                    let result = dispatch_tick(&mut local, 0, 1_000, 1_000_000, 100_000, 1, black_box(&domains));
                    black_box(result)
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_local_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_advance");

    group.bench_function("advance_empty", |b| {
        let mut local = LocalScheduler::new(0, 8);
        let domains: HashMap<DomainId, Domain> = HashMap::new();
        b.iter(|| {
            let next = local.advance(black_box(1_000), 1_000, 1_000_000, 100_000, 1, |id| domains.get(&id).cloned());
            black_box(next)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_dispatch_tick, bench_local_advance);
criterion_main!(benches);
