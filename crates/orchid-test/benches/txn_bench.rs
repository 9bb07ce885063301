//! Benchmarks for Orchid transactions and simulators

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use orchid_runtime::{AtomicConfig, AtomicRuleSimulator, ClockInput, ClockedConfig, ClockedSimulator, RunLength};
use orchid_test::{counter_mod8, dual_clock, three_ints};

fn bench_invoke_revert(c: &mut Criterion) {
    let mut model = three_ints().unwrap();
    let rule = model.find_rule().handler("set").param("which", 1).param("v", 9).first().unwrap().id();

    c.bench_function("invoke_revert", |b| {
        b.iter(|| {
            let invocation = model.invoke(black_box(rule));
            model.revert(&invocation).unwrap();
            black_box(invocation.hash_after())
        })
    });
}

fn bench_guarded_invoke(c: &mut Criterion) {
    let mut model = three_ints().unwrap();
    // `set` guards when the cell already holds the value
    let rule = model.find_rule().handler("set").param("which", 0).param("v", 0).first().unwrap().id();

    c.bench_function("guarded_invoke", |b| {
        b.iter(|| black_box(model.invoke(black_box(rule)).is_guarded()))
    });
}

fn bench_recompute_hash(c: &mut Criterion) {
    let model = three_ints().unwrap();

    c.bench_function("recompute_hash", |b| {
        b.iter(|| black_box(model.tree().recompute_hash()))
    });
}

fn bench_atomic_run(c: &mut Criterion) {
    c.bench_function("atomic_run_1000", |b| {
        b.iter_batched(
            || {
                let config = AtomicConfig {
                    show_output: false,
                    ..AtomicConfig::seeded(1)
                };
                AtomicRuleSimulator::with_config(counter_mod8().unwrap(), config)
            },
            |mut sim| black_box(sim.run(1000).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

fn bench_clocked_run(c: &mut Criterion) {
    let inputs = [
        ClockInput::period_ps(1000).named("clk").within("top"),
        ClockInput::period_ps(3333).named("clk_b"),
    ];

    c.bench_function("clocked_run_99001ps", |b| {
        b.iter_batched(
            || ClockedSimulator::with_config(dual_clock().unwrap(), &inputs, ClockedConfig::seeded(1)).unwrap(),
            |mut sim| black_box(sim.run(RunLength::Duration(99_001)).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_invoke_revert,
    bench_guarded_invoke,
    bench_recompute_hash,
    bench_atomic_run,
    bench_clocked_run,
);

criterion_main!(benches);
