//! Benchmark for the detection tick.
//!
//! TARGET: 1,000 tracked entities evaluated well inside one 50 ms tick
//!
//! Run with: cargo bench --package vigil_detection --bench detection_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use vigil_detection::{
    DetectionConfig, DetectionEngine, HostView, ScriptedHost, SinkError, Violation, ViolationSink,
};
use vigil_shared::{
    AttackSample, EntityId, EntityJoined, PositionSample, TargetKind, TimestampMs, Vec3,
};

/// Drops everything.
struct NullSink;

impl ViolationSink for NullSink {
    fn offer(&self, _violation: Violation) -> Result<(), SinkError> {
        Ok(())
    }
}

fn create_engine(entities: u64) -> DetectionEngine {
    let host = Arc::new(ScriptedHost::new());
    let engine = DetectionEngine::new(
        DetectionConfig::default(),
        Arc::clone(&host) as Arc<dyn HostView>,
        Arc::new(NullSink),
    )
    .expect("default config is valid");

    for i in 0..entities {
        let position = spawn_point(i);
        host.set_position(EntityId(i), position);
        engine.on_join(&EntityJoined {
            id: EntityId(i),
            display_name: format!("entity_{i}"),
            position,
            time_ms: 0,
        });
    }
    engine
}

fn spawn_point(i: u64) -> Vec3 {
    #[allow(clippy::cast_precision_loss)]
    let offset = (i % 100) as f64 * 10.0;
    #[allow(clippy::cast_precision_loss)]
    let row = (i / 100) as f64 * 10.0;
    Vec3::new(offset, 64.0, row)
}

/// One walking step per entity at `t`.
fn feed_positions(engine: &DetectionEngine, entities: u64, t: TimestampMs) {
    #[allow(clippy::cast_precision_loss)]
    let advance = t as f64 * 0.004;
    for i in 0..entities {
        let mut position = spawn_point(i);
        position.x += advance;
        engine.on_position(&PositionSample {
            id: EntityId(i),
            position,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
            vertical_velocity: None,
            time_ms: t,
        });
    }
}

fn benchmark_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for entities in [100_u64, 1_000] {
        group.throughput(Throughput::Elements(entities));
        group.bench_with_input(BenchmarkId::from_parameter(entities), &entities, |b, &n| {
            let engine = create_engine(n);
            let mut t: TimestampMs = 0;
            b.iter(|| {
                t += 50;
                feed_positions(&engine, n, t);
                black_box(engine.tick(black_box(t)))
            });
        });
    }

    group.finish();
}

fn benchmark_attack(c: &mut Criterion) {
    let engine = create_engine(16);

    c.bench_function("single_attack", |b| {
        let mut t: TimestampMs = 0;
        b.iter(|| {
            t += 120;
            engine.on_attack(black_box(&AttackSample {
                id: EntityId(0),
                target: EntityId(1),
                target_kind: TargetKind::Player,
                time_ms: t,
            }));
        });
    });
}

criterion_group!(benches, benchmark_tick, benchmark_attack);
criterion_main!(benches);
