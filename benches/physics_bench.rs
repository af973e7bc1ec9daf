use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use impulse_dynamics::{
    collision::{GJKAlgorithm, NarrowPhase, PlacedShape},
    config::DEFAULT_GRAVITY,
    dynamics::{mass_matrix, ForwardDynamicsCalculator},
    *,
};
use std::hint::black_box;

const DT: f64 = 1e-3;

fn box_definition(name: &str, position: DVec3) -> RobotDefinition {
    RobotDefinition::floating_body(
        name,
        MassProperties::solid_box(1.0, DVec3::splat(0.1)),
        Some(Shape::cuboid(DVec3::splat(0.1))),
        Pose::from_position(position),
    )
}

/// `count` boxes resting on the ground in a row, each its own collision group.
fn prepare_world(count: usize) -> PhysicsEngine {
    let mut engine = PhysicsEngine::new();
    engine
        .add_terrain_object(TerrainObjectDefinition::flat_ground(0.0))
        .expect("ground");
    for i in 0..count {
        let position = DVec3::new(i as f64 * 0.5, 0.0, 0.0999);
        engine
            .add_robot(box_definition(&format!("box_{i}"), position))
            .expect("box");
    }
    engine.initialize(DEFAULT_GRAVITY);
    engine
}

fn chain(links: usize) -> Robot {
    let mut def = RobotDefinition::new("chain");
    let mut parent = "root".to_string();
    for i in 0..links {
        let name = format!("link_{i}");
        def.add_body(RigidBodyDefinition::new(
            name.clone(),
            MassProperties::slender_rod(1.0, 0.3, DVec3::new(0.15, 0.0, 0.0)),
        ))
        .add_joint(
            JointDefinition::new(
                format!("joint_{i}"),
                parent,
                name.clone(),
                JointKindDefinition::Revolute(OneDofJointDefinition::new(if i % 2 == 0 {
                    DVec3::Y
                } else {
                    DVec3::Z
                })),
            )
            .with_frame(Pose::from_position(DVec3::new(0.3, 0.0, 0.0))),
        );
        parent = name;
    }
    Robot::from_definition(&def, 0).expect("chain")
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &count in &[16usize, 64, 256] {
        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            let mut engine = prepare_world(count);
            let mut tick = 0;
            b.iter(|| {
                tick += 1;
                black_box(engine.simulate(tick as f64 * DT, DT, DEFAULT_GRAVITY))
            })
        });
        group.bench_with_input(BenchmarkId::new("parallel", count), &count, |b, &count| {
            let mut engine = prepare_world(count);
            engine.set_parallel_enabled(true);
            let mut tick = 0;
            b.iter(|| {
                tick += 1;
                black_box(engine.simulate(tick as f64 * DT, DT, DEFAULT_GRAVITY))
            })
        });
    }
    group.finish();
}

fn bench_articulated_dynamics(c: &mut Criterion) {
    let mut group = c.benchmark_group("articulated_dynamics");
    for &links in &[6usize, 24, 96] {
        let mut robot = chain(links);
        let mut calculator = ForwardDynamicsCalculator::new();
        group.bench_with_input(BenchmarkId::new("aba", links), &links, |b, _| {
            b.iter(|| black_box(calculator.compute(&mut robot, DEFAULT_GRAVITY)))
        });
        group.bench_with_input(BenchmarkId::new("crba", links), &links, |b, _| {
            b.iter(|| black_box(mass_matrix(&robot)))
        });
    }
    group.finish();
}

fn bench_narrowphase(c: &mut Criterion) {
    let mut group = c.benchmark_group("narrowphase");
    let count = 1000;
    let shape = Shape::cuboid(DVec3::splat(0.5));
    let hull = Shape::convex_hull(vec![
        DVec3::new(0.5, 0.0, 0.0),
        DVec3::new(-0.5, 0.0, 0.0),
        DVec3::new(0.0, 0.5, 0.0),
        DVec3::new(0.0, -0.5, 0.0),
        DVec3::new(0.0, 0.0, 0.5),
        DVec3::new(0.0, 0.0, -0.5),
    ]);
    let poses_a: Vec<Pose> = (0..count)
        .map(|i| Pose::from_position(DVec3::new(i as f64 * 2.0, 0.0, 0.0)))
        .collect();
    let poses_b: Vec<Pose> = (0..count)
        .map(|i| {
            Pose::new(
                DVec3::new(i as f64 * 2.0 + 0.8, 0.1, 0.0),
                DQuat::from_rotation_z(0.3),
            )
        })
        .collect();

    group.bench_function("box_box_sat", |b| {
        b.iter(|| {
            for (pa, pb) in poses_a.iter().zip(&poses_b) {
                black_box(NarrowPhase::collide(&shape, pa, &shape, pb));
            }
        })
    });
    group.bench_function("hull_gjk_epa", |b| {
        b.iter(|| {
            for (pa, pb) in poses_a.iter().zip(&poses_b) {
                black_box(GJKAlgorithm::intersect(
                    &PlacedShape::new(&hull, pa),
                    &PlacedShape::new(&shape, pb),
                ));
            }
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_world_step,
    bench_articulated_dynamics,
    bench_narrowphase
);
criterion_main!(benches);
