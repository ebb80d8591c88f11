//! Scheduler hot-path benchmarks.
//!
//! Measures raw heap throughput (schedule + dispatch), callback
//! dispatch, and process switching via a ping-pong model.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use kairos::{Simulation, VirtualTime};

fn bench_schedule_and_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_and_run");
    for n in [1_000u64, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut sim = Simulation::new();
                for i in 0..n {
                    // Coarse delay grid so same-time ties stress the
                    // insertion-id ordering.
                    sim.timeout(black_box((i % 97) as f64));
                }
                sim.run();
                black_box(sim.events_processed())
            })
        });
    }
    group.finish();
}

fn bench_callback_dispatch(c: &mut Criterion) {
    c.bench_function("callback_dispatch_10k", |b| {
        b.iter(|| {
            let mut sim = Simulation::new();
            let mut count = 0u64;
            let counter = std::rc::Rc::new(std::cell::Cell::new(0u64));
            for i in 0..10_000u64 {
                let counter = counter.clone();
                sim.timeout((i % 13) as f64)
                    .add_callback(move || counter.set(counter.get() + 1));
                count += 1;
            }
            sim.run();
            assert_eq!(counter.get(), count);
            black_box(counter.get())
        })
    });
}

fn bench_process_ping_pong(c: &mut Criterion) {
    c.bench_function("process_ping_pong_1k_rounds", |b| {
        b.iter(|| {
            let mut sim = Simulation::new();
            let ctx = sim.handle();
            sim.spawn(async move {
                for _ in 0..1_000 {
                    ctx.timeout(1.0).await;
                }
            });
            sim.run_until(VirtualTime::new(2_000.0));
            black_box(sim.events_processed())
        })
    });
}

criterion_group!(
    benches,
    bench_schedule_and_run,
    bench_callback_dispatch,
    bench_process_ping_pong
);
criterion_main!(benches);
