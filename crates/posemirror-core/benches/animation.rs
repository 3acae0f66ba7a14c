//! Benchmarks for the per-frame animation path
//!
//! Run with: cargo bench --bench animation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use posemirror_core::backend::HeadlessContainer;
use posemirror_core::{
    advance, fixtures, ContainerTarget, ManualClock, RigDescriptor, Snapshot, Visualizer,
};

fn ready(rig: RigDescriptor, clock: &ManualClock) -> Visualizer {
    let container = HeadlessContainer::new(800, 600);
    let backend = fixtures::headless_backend(&rig, &container);
    let mut viz = Visualizer::new(rig, backend).with_clock(clock.clone());
    viz.initialize(ContainerTarget::Element(Box::new(container)));
    viz
}

/// Single controller blend step
fn bench_advance(c: &mut Criterion) {
    let mut group = c.benchmark_group("advance");
    let clock = ManualClock::new();
    let viz = ready(RigDescriptor::nao(), &clock);

    let idle = viz.controller("HeadYaw").cloned();
    if let Some(idle) = idle {
        group.bench_function("idle wave", |b| {
            b.iter(|| black_box(advance(black_box(&idle), 0.016, 3.0, 1.5)))
        });
    }

    if let Some(mut live) = viz.controller("LElbowYaw").cloned() {
        live.command(0.4, 2.9);
        group.bench_function("live target", |b| {
            b.iter(|| black_box(advance(black_box(&live), 0.016, 3.0, 1.5)))
        });
    }

    group.finish();
}

/// Whole controller set, idle and live
fn bench_step_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_all");
    let clock = ManualClock::new();

    for rig in [RigDescriptor::pepper(), RigDescriptor::nao()] {
        let name = rig.name.clone();
        let viz = ready(rig, &clock);
        let mut controllers = viz.controllers().clone();

        group.bench_with_input(BenchmarkId::new("idle", &name), &name, |b, _| {
            let mut elapsed = 0.0;
            b.iter(|| {
                elapsed += 0.016;
                black_box(controllers.step_all(0.016, elapsed, 1.5))
            })
        });

        let names: Vec<String> = controllers.names().into_iter().map(str::to_string).collect();
        for joint in &names {
            if let Some(c) = controllers.get_mut(joint) {
                c.command(0.1, 0.0);
            }
        }
        group.bench_with_input(BenchmarkId::new("live", &name), &name, |b, _| {
            b.iter(|| black_box(controllers.step_all(0.016, 0.5, f64::INFINITY)))
        });
    }

    group.finish();
}

/// Full frame on the headless backend, with and without telemetry
fn bench_on_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_frame");

    for rig in [RigDescriptor::pepper(), RigDescriptor::nao()] {
        let name = rig.name.clone();
        let clock = ManualClock::new();
        let mut viz = ready(rig, &clock);

        group.bench_with_input(BenchmarkId::new("idle", &name), &name, |b, _| {
            b.iter(|| {
                clock.advance(1.0 / 60.0);
                black_box(viz.on_frame())
            })
        });

        let feed = viz.telemetry_feed();
        let snapshot = Snapshot::from_readings(
            viz.rig()
                .joints
                .iter()
                .map(|j| (j.joint.clone(), 0.1))
                .collect::<Vec<_>>(),
        );
        group.bench_with_input(BenchmarkId::new("with telemetry", &name), &name, |b, _| {
            b.iter(|| {
                let _ = feed.try_send(snapshot.clone());
                clock.advance(1.0 / 60.0);
                black_box(viz.on_frame())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_advance, bench_step_all, bench_on_frame);
criterion_main!(benches);
