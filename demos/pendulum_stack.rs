use impulse_dynamics::{config::DEFAULT_GRAVITY, *};

/// Holds every joint at zero with a PD law.
struct HoldPosture {
    stiffness: f64,
    damping: f64,
}

impl Controller for HoldPosture {
    fn initialize(&mut self, robot: &Robot, registry: &Registry) {
        registry.set("joint_count", robot.dof_count() as f64);
    }

    fn do_control(&mut self, _time: f64, robot: &mut Robot) {
        for joint in &mut robot.joints {
            if let JointKind::OneDof(joint) = &mut joint.kind {
                joint.tau = -self.stiffness * joint.q - self.damping * joint.qd;
            }
        }
    }
}

fn pendulum(name: &str, links: usize, x: f64, limited: bool) -> RobotDefinition {
    let mut def = RobotDefinition::new(name);
    let mut parent = "root".to_string();
    for i in 0..links {
        let body = format!("link_{i}");
        let mut joint = OneDofJointDefinition::new(DVec3::Y).with_effort_limit(40.0);
        if limited {
            joint = joint.with_limits(-0.8, 0.8);
        }
        let frame = if i == 0 {
            Pose::from_position(DVec3::new(x, 0.0, 2.0))
        } else {
            Pose::from_position(DVec3::new(0.0, 0.0, -0.4))
        };
        def.add_body(
            RigidBodyDefinition::new(
                body.clone(),
                MassProperties::slender_rod(1.0, 0.4, DVec3::new(0.0, 0.0, -0.2)),
            )
            .with_shape(
                CollisionShapeDefinition::new(Shape::capsule(0.04, 0.3))
                    .with_pose(Pose::from_position(DVec3::new(0.0, 0.0, -0.2))),
            ),
        )
        .add_joint(
            JointDefinition::new(
                format!("joint_{i}"),
                parent,
                body.clone(),
                JointKindDefinition::Revolute(joint),
            )
            .with_frame(frame),
        );
        parent = body;
    }
    def
}

fn main() -> Result<()> {
    let mut engine = PhysicsEngine::new();
    engine.add_terrain_object(TerrainObjectDefinition::flat_ground(0.0))?;
    engine.set_parallel_enabled(true);

    let kick = |joint: &Joint| {
        (joint.name == "joint_0").then_some(JointStateDefinition::OneDof {
            q: 0.3,
            qd: 2.0,
            tau: 0.0,
        })
    };
    engine.add_robot_with(
        pendulum("free", 4, 0.0, true),
        RobotAttachments::new().with_initial_state_provider(kick),
    )?;
    engine.add_robot_with(
        pendulum("held", 4, 0.3, false),
        RobotAttachments::new().with_controller(HoldPosture {
            stiffness: 60.0,
            damping: 4.0,
        }),
    )?;
    engine.initialize(DEFAULT_GRAVITY);

    let dt = 5e-4;
    let mut degraded = 0;
    for tick in 0..8000 {
        let report = engine.simulate(tick as f64 * dt, dt, DEFAULT_GRAVITY)?;
        degraded += usize::from(report.is_degraded());
        if tick % 1000 == 0 {
            for robot in engine.robots() {
                let q: Vec<String> = robot
                    .generalized_velocity()
                    .iter()
                    .map(|v| format!("{v:+.2}"))
                    .collect();
                println!("{:>5} qd = [{}]", robot.name(), q.join(", "));
            }
            println!("groups = {}", report.group_count);
        }
    }

    println!("degraded ticks: {degraded}");
    for (key, value) in engine.registry().snapshot() {
        println!("{key} = {value}");
    }
    Ok(())
}
