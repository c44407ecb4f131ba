//! Movement benchmarks for loco_core.
//!
//! Run with: `cargo bench -p loco_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loco_core::entity::AccelModel;
use loco_core::math::Point;
use loco_core::simulation::{EntitySpawnParams, Simulation};

fn crowded_sim() -> Simulation {
    let mut sim = Simulation::new();
    let mut units = Vec::new();
    for i in 0..64u16 {
        let unit = sim
            .spawn(EntitySpawnParams {
                position: Point::new(200 + (i % 8) * 24, 200 + (i / 8) * 24),
                accel_model: AccelModel::FixedTopSpeed,
                ..EntitySpawnParams::default()
            })
            .expect("spawn");
        units.push(unit);
    }
    for (i, unit) in units.iter().enumerate() {
        let target = Point::new(1200 - (i as u16 % 8) * 24, 1200 - (i as u16 / 8) * 24);
        sim.command_move(*unit, target).expect("command");
    }
    sim
}

pub fn movement_benchmark(c: &mut Criterion) {
    c.bench_function("crowded_movement_100_ticks", |b| {
        b.iter(|| {
            let mut sim = crowded_sim();
            for _ in 0..100 {
                sim.tick();
            }
            black_box(sim.state_hash())
        })
    });

    c.bench_function("single_mover_500_ticks", |b| {
        b.iter(|| {
            let mut sim = Simulation::new();
            let unit = sim
                .spawn(EntitySpawnParams {
                    position: Point::new(100, 100),
                    ..EntitySpawnParams::default()
                })
                .expect("spawn");
            sim.command_move(unit, Point::new(1800, 1800)).expect("command");
            for _ in 0..500 {
                sim.tick();
            }
            black_box(sim.state_hash())
        })
    });
}

criterion_group!(benches, movement_benchmark);
criterion_main!(benches);
