use impulse_dynamics::{config::DEFAULT_GRAVITY, PhysicsEngine, Registry, TerrainObjectDefinition};
use std::thread;

#[test]
fn engine_and_registry_can_move_across_threads() {
    fn assert_send<T: Send>() {}
    fn assert_sync_send<T: Sync + Send>() {}
    assert_send::<PhysicsEngine>();
    assert_sync_send::<Registry>();
}

#[test]
fn engine_runs_on_a_worker_thread() {
    let mut engine = PhysicsEngine::new();
    engine
        .add_terrain_object(TerrainObjectDefinition::flat_ground(0.0))
        .unwrap();
    engine.initialize(DEFAULT_GRAVITY);
    let registry = engine.registry().clone();

    let handle = thread::spawn(move || {
        for tick in 0..10 {
            engine
                .simulate(tick as f64 * 1e-3, 1e-3, DEFAULT_GRAVITY)
                .unwrap();
        }
        engine
    });
    let engine = handle.join().unwrap();
    assert_eq!(engine.robots().len(), 0);
    assert_eq!(registry.get("collision_count"), Some(0.0));
}
