use approx::assert_relative_eq;
use impulse_dynamics::{
    config::DEFAULT_GRAVITY, ConfigurationError, DQuat, DVec3, ImuSensorDefinition,
    JointDefinition, JointKindDefinition, JointStateDefinition, MassProperties,
    OneDofJointDefinition, PhysicsEngine, PhysicsError, Pose, RigidBodyDefinition,
    RobotDefinition,
};

const DT: f64 = 1e-3;

fn falling_box_with_imu(orientation: DQuat) -> RobotDefinition {
    let mut def = RobotDefinition::floating_body(
        "sensor_box",
        MassProperties::solid_box(2.0, DVec3::splat(0.1)),
        None,
        Pose::new(DVec3::new(0.0, 0.0, 5.0), orientation),
    );
    def.bodies[1]
        .imu_sensors
        .push(ImuSensorDefinition::new("pelvis_imu", Pose::from_position(DVec3::new(0.05, 0.0, 0.0))));
    def
}

#[test]
fn imu_reads_before_the_first_tick() {
    let orientation = DQuat::from_rotation_x(0.6);
    let mut engine = PhysicsEngine::new();
    let handle = engine.add_robot(falling_box_with_imu(orientation)).unwrap();
    engine.initialize(DEFAULT_GRAVITY);

    let imu = engine.robot(handle).unwrap().imu_sensor("pelvis_imu").unwrap();
    assert!(imu.orientation().abs_diff_eq(orientation, 1e-12));
    assert!(imu.angular_velocity().abs_diff_eq(DVec3::ZERO, 1e-12));
    let expected = orientation.inverse() * DEFAULT_GRAVITY;
    assert!(imu.linear_acceleration().abs_diff_eq(expected, 1e-9));
}

#[test]
fn falling_imu_keeps_reading_gravity() {
    let orientation = DQuat::from_rotation_y(-0.3);
    let mut engine = PhysicsEngine::new();
    let handle = engine.add_robot(falling_box_with_imu(orientation)).unwrap();
    engine.initialize(DEFAULT_GRAVITY);

    for tick in 0..50 {
        engine.simulate(tick as f64 * DT, DT, DEFAULT_GRAVITY).unwrap();
        let imu = engine.robot(handle).unwrap().imu_sensor("pelvis_imu").unwrap();
        let expected = orientation.inverse() * DEFAULT_GRAVITY;
        assert!(
            imu.linear_acceleration().abs_diff_eq(expected, 1e-6),
            "tick {tick}: {:?}",
            imu.linear_acceleration()
        );
    }
}

#[test]
fn spinning_arm_imu_sees_centripetal_acceleration() {
    let mut def = RobotDefinition::new("turntable");
    def.add_body(
        RigidBodyDefinition::new("plate", MassProperties::solid_sphere(1.0, 0.2))
            .with_imu(ImuSensorDefinition::new("rim_imu", Pose::from_position(DVec3::new(0.5, 0.0, 0.0)))),
    )
    .add_joint(
        JointDefinition::new(
            "spindle",
            "root",
            "plate",
            JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::Z)),
        )
        .with_initial_state(JointStateDefinition::OneDof {
            q: 0.0,
            qd: 2.0,
            tau: 0.0,
        }),
    );
    let mut engine = PhysicsEngine::new();
    let handle = engine.add_robot(def).unwrap();
    engine.initialize(DVec3::ZERO);
    for tick in 0..100 {
        engine.simulate(tick as f64 * DT, DT, DVec3::ZERO).unwrap();
    }

    let imu = engine.robot(handle).unwrap().imu_sensor("rim_imu").unwrap();
    assert!(imu.angular_velocity().abs_diff_eq(DVec3::new(0.0, 0.0, 2.0), 1e-9));
    let a = imu.linear_acceleration();
    assert_relative_eq!(a.x, -2.0, epsilon = 1e-2);
    assert_relative_eq!(a.y, 0.0, epsilon = 1e-2);
    assert_relative_eq!(a.z, 0.0, epsilon = 1e-9);
}

#[test]
fn duplicate_sensor_names_are_rejected() {
    let mut def = falling_box_with_imu(DQuat::IDENTITY);
    def.bodies[1]
        .imu_sensors
        .push(ImuSensorDefinition::new("pelvis_imu", Pose::IDENTITY));
    let mut engine = PhysicsEngine::new();
    let err = engine.add_robot(def).unwrap_err();
    assert!(matches!(
        err,
        PhysicsError::Configuration(ConfigurationError::DuplicateName { kind: "sensor", .. })
    ));
    assert!(engine.robots().is_empty());
}
