use impulse_dynamics::{config::DEFAULT_GRAVITY, *};

fn main() -> Result<()> {
    let mut engine = PhysicsEngine::new();
    engine.add_terrain_object(TerrainObjectDefinition::flat_ground(0.0))?;

    let box_shape = Shape::cuboid(DVec3::new(0.2, 0.1, 0.1));
    let handle = engine.add_robot(RobotDefinition::floating_body(
        "box",
        MassProperties::solid_box(2.0, DVec3::new(0.2, 0.1, 0.1)),
        Some(box_shape),
        Pose::new(DVec3::new(0.0, 0.0, 1.0), DQuat::from_rotation_y(0.5)),
    ))?;
    engine.initialize(DEFAULT_GRAVITY);

    let dt = 1e-3;
    for tick in 0..3000 {
        let report = engine.simulate(tick as f64 * dt, dt, DEFAULT_GRAVITY)?;
        if tick % 250 == 0 {
            let body = &engine.robot(handle)?.bodies[1];
            println!(
                "t = {:.3} s  z = {:.4} m  contacts = {}",
                report.time,
                body.pose.position.z,
                engine.contact_impulses().len()
            );
        }
    }

    println!("{}", engine.profiler().report());
    Ok(())
}
