use approx::assert_relative_eq;
use impulse_dynamics::{
    config::DEFAULT_GRAVITY, DVec3, JointDefinition, JointKindDefinition, JointStateDefinition,
    MassProperties,
    OneDofJointDefinition, PhysicsEngine, RigidBodyDefinition, RobotDefinition,
};

const DT: f64 = 1e-3;

fn single_joint(kind: JointKindDefinition, mass: MassProperties) -> RobotDefinition {
    let mut def = RobotDefinition::new("limited");
    def.add_body(RigidBodyDefinition::new("link", mass))
        .add_joint(JointDefinition::new("joint", "root", "link", kind));
    def
}

#[test]
fn falling_pendulum_stops_at_its_upper_limit() {
    let joint = OneDofJointDefinition::new(DVec3::Y).with_limits(-0.5, 0.5);
    let mass = MassProperties::solid_sphere(1.0, 0.05).with_center_of_mass(DVec3::new(0.5, 0.0, 0.0));
    let mut engine = PhysicsEngine::new();
    let handle = engine
        .add_robot(single_joint(JointKindDefinition::Revolute(joint), mass))
        .unwrap();
    engine.initialize(DEFAULT_GRAVITY);

    let mut limited_ticks = 0;
    for tick in 0..2000 {
        let report = engine.simulate(tick as f64 * DT, DT, DEFAULT_GRAVITY).unwrap();
        assert_eq!(report.group_count, 0);
        let joint = engine.robot(handle).unwrap().one_dof_joint("joint").unwrap();
        assert!(joint.q <= 0.5 + 1e-9, "tick {tick}: q = {}", joint.q);
        if report.solver_iterations > 0 {
            limited_ticks += 1;
            assert!(joint.qd <= 1e-12, "tick {tick}: qd into the limit is {}", joint.qd);
        }
    }
    assert!(limited_ticks > 0);
    let joint = engine.robot(handle).unwrap().one_dof_joint("joint").unwrap();
    assert_relative_eq!(joint.q, 0.5, epsilon = 1e-4);
    assert!(joint.qd.abs() < 1e-9);
}

#[test]
fn pushed_slider_halts_just_inside_its_limit() {
    let mut def = RobotDefinition::new("pushed");
    def.add_body(RigidBodyDefinition::new("cart", MassProperties::solid_sphere(2.0, 0.1)))
        .add_joint(
            JointDefinition::new(
                "joint",
                "root",
                "cart",
                JointKindDefinition::Prismatic(
                    OneDofJointDefinition::new(DVec3::X).with_limits(-0.5, 0.5),
                ),
            )
            .with_initial_state(JointStateDefinition::OneDof {
                q: 0.499,
                qd: 0.0,
                tau: 1e4,
            }),
        );
    let mut engine = PhysicsEngine::new();
    let handle = engine.add_robot(def).unwrap();
    engine.initialize(DEFAULT_GRAVITY);

    let report = engine.simulate(0.0, DT, DEFAULT_GRAVITY).unwrap();
    assert!(report.solver_iterations > 0);
    let joint = engine.robot(handle).unwrap().one_dof_joint("joint").unwrap();
    assert!(joint.q <= 0.5);
    assert!(joint.qd <= 1e-12, "qd toward the upper limit is {}", joint.qd);
}

#[test]
fn vertical_slider_is_held_at_its_velocity_limit() {
    let joint = OneDofJointDefinition::new(DVec3::Z).with_velocity_limit(0.5);
    let mut engine = PhysicsEngine::new();
    let handle = engine
        .add_robot(single_joint(
            JointKindDefinition::Prismatic(joint),
            MassProperties::solid_sphere(2.0, 0.1),
        ))
        .unwrap();
    engine.initialize(DEFAULT_GRAVITY);

    for tick in 0..500 {
        engine.simulate(tick as f64 * DT, DT, DEFAULT_GRAVITY).unwrap();
        let qd = engine.robot(handle).unwrap().one_dof_joint("joint").unwrap().qd;
        assert!(qd >= -0.5 - 1e-12, "tick {tick}: qd = {qd}");
    }
    let qd = engine.robot(handle).unwrap().one_dof_joint("joint").unwrap().qd;
    assert_relative_eq!(qd, -0.5, epsilon = 1e-12);
}

#[test]
fn unlimited_joint_needs_no_limit_pass() {
    let mass = MassProperties::solid_sphere(1.0, 0.05).with_center_of_mass(DVec3::new(0.5, 0.0, 0.0));
    let mut engine = PhysicsEngine::new();
    engine
        .add_robot(single_joint(
            JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::Y)),
            mass,
        ))
        .unwrap();
    engine.initialize(DEFAULT_GRAVITY);
    let report = engine.simulate(0.0, DT, DEFAULT_GRAVITY).unwrap();
    assert_eq!(report.solver_iterations, 0);
    assert_eq!(report.uncovered_robot_count, 1);
}
