use impulse_dynamics::{
    config::DEFAULT_GRAVITY, DQuat, DVec3, JointDefinition, JointKindDefinition,
    JointStateDefinition, MassProperties, OneDofJointDefinition, PhysicsEngine, Pose,
    RigidBodyDefinition, Robot, RobotDefinition, Shape, SpatialVec, TerrainObjectDefinition,
};

const DT: f64 = 1e-3;

fn tumbling_box(name: &str, x: f64) -> RobotDefinition {
    let pose = Pose::new(DVec3::new(x, 0.0, 0.4), DQuat::from_rotation_x(0.3));
    let mut def = RobotDefinition::floating_body(
        name,
        MassProperties::solid_box(1.0, DVec3::new(0.1, 0.15, 0.05)),
        Some(Shape::cuboid(DVec3::new(0.1, 0.15, 0.05))),
        pose,
    );
    def.joints[0].initial_state = Some(JointStateDefinition::SixDof {
        pose,
        twist: SpatialVec::new(DVec3::new(1.0, -2.0, 0.5), DVec3::new(0.3, 0.0, 0.0)),
    });
    def
}

fn arm(name: &str, x: f64) -> RobotDefinition {
    let mut def = RobotDefinition::new(name);
    def.add_body(
        RigidBodyDefinition::new(
            "link",
            MassProperties::slender_rod(1.0, 0.6, DVec3::new(0.3, 0.0, 0.0)),
        )
        .with_shape(
            impulse_dynamics::CollisionShapeDefinition::new(Shape::capsule(0.05, 0.5)).with_pose(
                Pose::new(
                    DVec3::new(0.3, 0.0, 0.0),
                    DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2),
                ),
            ),
        ),
    )
    .add_joint(
        JointDefinition::new(
            "shoulder",
            "root",
            "link",
            JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::Y).with_limits(-1.0, 1.2)),
        )
        .with_frame(Pose::from_position(DVec3::new(x, 0.0, 0.3))),
    );
    def
}

fn scene(with_second_cluster: bool) -> PhysicsEngine {
    let mut engine = PhysicsEngine::new();
    engine
        .add_terrain_object(TerrainObjectDefinition::flat_ground(0.0))
        .unwrap();
    engine.add_robot(tumbling_box("box", 0.0)).unwrap();
    engine.add_robot(arm("arm", -0.2)).unwrap();
    if with_second_cluster {
        engine.add_robot(tumbling_box("far_box", 20.0)).unwrap();
        engine.add_robot(arm("far_arm", 19.8)).unwrap();
    }
    engine.initialize(DEFAULT_GRAVITY);
    engine
}

/// Bit patterns of the joint state, so comparisons are exact.
fn state(robot: &Robot) -> Vec<u64> {
    let mut bits: Vec<u64> = robot
        .generalized_velocity()
        .into_iter()
        .map(f64::to_bits)
        .collect();
    for body in &robot.bodies {
        let p = body.pose.position;
        let o = body.pose.orientation;
        bits.extend([p.x, p.y, p.z, o.x, o.y, o.z, o.w].map(f64::to_bits));
    }
    bits
}

#[test]
fn identical_engines_produce_identical_trajectories() {
    let mut first = scene(true);
    let mut second = scene(true);
    for tick in 0..600 {
        let t = tick as f64 * DT;
        let a = first.simulate(t, DT, DEFAULT_GRAVITY).unwrap();
        let b = second.simulate(t, DT, DEFAULT_GRAVITY).unwrap();
        assert_eq!(a, b);
        for (ra, rb) in first.robots().iter().zip(second.robots()) {
            assert_eq!(state(ra), state(rb), "tick {tick}");
        }
    }
}

#[test]
fn disjoint_groups_do_not_influence_each_other() {
    let mut alone = scene(false);
    let mut crowded = scene(true);
    let mut saw_contact = false;
    for tick in 0..600 {
        let t = tick as f64 * DT;
        alone.simulate(t, DT, DEFAULT_GRAVITY).unwrap();
        let report = crowded.simulate(t, DT, DEFAULT_GRAVITY).unwrap();
        saw_contact |= report.group_count >= 2;
        for (ra, rb) in alone.robots().iter().zip(&crowded.robots()[..2]) {
            assert_eq!(state(ra), state(rb), "tick {tick}");
        }
    }
    assert!(saw_contact);
}

#[cfg(feature = "parallel")]
#[test]
fn parallel_group_solve_matches_sequential() {
    let mut sequential = scene(true);
    let mut parallel = scene(true);
    parallel.set_parallel_enabled(true);
    for tick in 0..600 {
        let t = tick as f64 * DT;
        sequential.simulate(t, DT, DEFAULT_GRAVITY).unwrap();
        parallel.simulate(t, DT, DEFAULT_GRAVITY).unwrap();
        for (ra, rb) in sequential.robots().iter().zip(parallel.robots()) {
            assert_eq!(state(ra), state(rb), "tick {tick}");
        }
    }
}
