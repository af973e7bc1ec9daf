//! The engine orchestrator: owns robots, terrain and the per-tick scratch
//! state, and runs the fixed pipeline once per [`PhysicsEngine::simulate`].

use glam::DVec3;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::{
        contact::{Collision, ContactImpulse},
        detector::CollisionDetector,
    },
    config::{ConstraintParameters, ContactParameters, SolverParameters},
    controller::{Controller, PhysicsPlugin, RobotAttachments},
    core::{
        collider::{Collidable, CollidableOwner},
        definition::{RobotDefinition, TerrainObjectDefinition},
        robot::Robot,
    },
    dynamics::{
        aba::ForwardDynamicsCalculator,
        integrator::Integrator,
        island::{CollisionGroup, IslandManager, Partition},
        solver::{solve_group, solve_joint_limits, GroupSolution},
    },
    error::{ConfigurationError, Degradation, MisuseError, PhysicsError, Result},
    utils::{
        allocator::TickArena,
        logging::{RealTimeMonitor, StageTrace},
        profiling::{PhysicsProfiler, ScopedTimer},
        registry::Registry,
    },
};

/// Stable reference to a robot added to a [`PhysicsEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RobotHandle(usize);

impl RobotHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub time: f64,
    pub collision_count: usize,
    pub group_count: usize,
    pub uncovered_robot_count: usize,
    /// Largest iteration count over all solved groups.
    pub solver_iterations: usize,
    pub degradations: Vec<Degradation>,
}

impl TickReport {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// Controller and plugins of one robot.
struct RobotCallbacks {
    controller: Option<Box<dyn Controller>>,
    plugins: Vec<Box<dyn PhysicsPlugin>>,
    registry: Registry,
}

/// Multi-robot articulated rigid-body engine.
///
/// ```no_run
/// use impulse_dynamics::{config::DEFAULT_GRAVITY, PhysicsEngine, TerrainObjectDefinition};
///
/// let mut engine = PhysicsEngine::new();
/// engine.add_terrain_object(TerrainObjectDefinition::flat_ground(0.0)).unwrap();
/// engine.initialize(DEFAULT_GRAVITY);
/// engine.simulate(0.0, 1e-3, DEFAULT_GRAVITY).unwrap();
/// ```
pub struct PhysicsEngine {
    robots: Vec<Robot>,
    callbacks: Vec<RobotCallbacks>,
    robot_definitions: Vec<RobotDefinition>,
    terrain_object_definitions: Vec<TerrainObjectDefinition>,
    terrain: Vec<Collidable>,

    contact_parameters: ContactParameters,
    constraint_parameters: ConstraintParameters,
    solver_parameters: SolverParameters,

    forward_dynamics: ForwardDynamicsCalculator,
    detector: CollisionDetector,
    islands: IslandManager,
    integrator: Integrator,

    collisions: TickArena<Collision>,
    edges: Vec<(usize, usize)>,
    contact_impulses: Vec<ContactImpulse>,

    registry: Registry,
    profiler: PhysicsProfiler,
    gravity: DVec3,
    initialized: bool,
    parallel_enabled: bool,
    nonconvergence_warned: bool,
    real_time: RealTimeMonitor,
}

impl Default for PhysicsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsEngine {
    pub fn new() -> Self {
        Self::with_registry(Registry::new("physics_engine"))
    }

    /// Engine publishing its diagnostics into `registry`.
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            robots: Vec::new(),
            callbacks: Vec::new(),
            robot_definitions: Vec::new(),
            terrain_object_definitions: Vec::new(),
            terrain: Vec::new(),
            contact_parameters: ContactParameters::default(),
            constraint_parameters: ConstraintParameters::default(),
            solver_parameters: SolverParameters::default(),
            forward_dynamics: ForwardDynamicsCalculator::new(),
            detector: CollisionDetector::new(),
            islands: IslandManager::new(),
            integrator: Integrator::new(),
            collisions: TickArena::new(),
            edges: Vec::new(),
            contact_impulses: Vec::new(),
            registry,
            profiler: PhysicsProfiler::default(),
            gravity: crate::config::DEFAULT_GRAVITY,
            initialized: false,
            parallel_enabled: false,
            nonconvergence_warned: false,
            real_time: RealTimeMonitor::new(),
        }
    }

    pub fn add_robot(&mut self, definition: RobotDefinition) -> Result<RobotHandle> {
        self.add_robot_with(definition, RobotAttachments::new())
    }

    /// Builds a robot and attaches its controller, initial state provider and
    /// plugins. Nothing is modified when the definition is rejected.
    pub fn add_robot_with(
        &mut self,
        definition: RobotDefinition,
        attachments: RobotAttachments,
    ) -> Result<RobotHandle> {
        if self.robots.iter().any(|r| r.name() == definition.name) {
            return Err(ConfigurationError::DuplicateRobot(definition.name).into());
        }
        let index = self.robots.len();
        let mut robot = Robot::from_definition(&definition, index)?;
        attachments.apply_initial_states(&mut robot);

        let RobotAttachments {
            mut controller,
            plugins,
            ..
        } = attachments;
        let registry = self.registry.child("robots").child(robot.name());
        if self.initialized {
            self.forward_dynamics.compute(&mut robot, self.gravity);
            robot.initialize_sensors();
            if let Some(controller) = controller.as_mut() {
                controller.initialize(&robot, &registry.child("controller"));
            }
        }

        log::debug!(
            "added robot '{}' with {} bodies, {} dofs, {} collidables",
            robot.name(),
            robot.bodies.len(),
            robot.dof_count(),
            robot.collidables.len()
        );
        self.robots.push(robot);
        self.callbacks.push(RobotCallbacks {
            controller,
            plugins,
            registry,
        });
        self.robot_definitions.push(definition);
        Ok(RobotHandle(index))
    }

    pub fn add_terrain_object(&mut self, definition: TerrainObjectDefinition) -> Result<()> {
        definition.validate()?;
        let object = self.terrain_object_definitions.len();
        self.terrain
            .extend(definition.collision_shapes.iter().map(|shape| {
                Collidable::new(
                    CollidableOwner::Terrain { object },
                    shape.pose,
                    shape.shape.clone(),
                    shape.filter,
                )
            }));
        self.terrain_object_definitions.push(definition);
        Ok(())
    }

    /// Runs forward dynamics once, takes the first sensor readings and
    /// initializes every controller.
    ///
    /// Returns `false`, doing nothing, on every call after the first.
    pub fn initialize(&mut self, gravity: DVec3) -> bool {
        if self.initialized {
            return false;
        }
        self.gravity = gravity;
        for (robot, callbacks) in self.robots.iter_mut().zip(&mut self.callbacks) {
            robot.update_collidables();
            self.forward_dynamics.compute(robot, gravity);
            robot.initialize_sensors();
            if let Some(controller) = callbacks.controller.as_mut() {
                controller.initialize(robot, &callbacks.registry.child("controller"));
            }
        }
        self.initialized = true;
        log::info!(
            "physics engine initialized: {} robots, {} terrain collidables",
            self.robots.len(),
            self.terrain.len()
        );
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Advances the world by exactly one tick of `dt`.
    ///
    /// Numerical trouble never aborts the tick; it is listed in the report.
    pub fn simulate(&mut self, current_time: f64, dt: f64, gravity: DVec3) -> Result<TickReport> {
        if !self.initialized {
            return Err(MisuseError::NotInitialized.into());
        }
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(MisuseError::InvalidTimeStep(dt).into());
        }

        self.gravity = gravity;
        let mut profiler = PhysicsProfiler::default();
        let mut report = TickReport {
            time: current_time,
            ..TickReport::default()
        };
        {
            let _total = ScopedTimer::new(&mut profiler.total);
            {
                let _trace = StageTrace::enter("initial_phase", current_time);
                let _timer = ScopedTimer::new(&mut profiler.initial_phase);
                self.initial_phase(current_time, dt, gravity, &mut report);
            }
            {
                let _trace = StageTrace::enter("detect_collisions", current_time);
                let _timer = ScopedTimer::new(&mut profiler.detect_collisions);
                self.detect_collisions();
            }
            {
                let _trace = StageTrace::enter("configure_collision_handlers", current_time);
                let _timer = ScopedTimer::new(&mut profiler.configure_collision_handlers);
                self.configure_collision_handlers();
            }
            {
                let _trace = StageTrace::enter("handle_collisions", current_time);
                let _timer = ScopedTimer::new(&mut profiler.handle_collisions);
                self.handle_collisions(dt, &mut report);
            }
            {
                let _trace = StageTrace::enter("final_phase", current_time);
                let _timer = ScopedTimer::new(&mut profiler.final_phase);
                self.final_phase(dt);
            }
        }

        let partition = self.islands.partition();
        report.collision_count = self.collisions.len();
        report.group_count = partition.groups.len();
        report.uncovered_robot_count = partition.uncovered.len();
        profiler.collision_count = report.collision_count;
        profiler.group_count = report.group_count;
        profiler.publish(&self.registry, dt);
        if self.real_time.record(profiler.total, dt) {
            self.registry.increment("slower_than_real_time_count", 1.0);
        }
        self.profiler = profiler;
        self.record_degradations(&report.degradations);
        Ok(report)
    }

    /// Forwards to every controller.
    pub fn pause(&mut self) {
        for controller in self.callbacks.iter_mut().filter_map(|c| c.controller.as_mut()) {
            controller.pause();
        }
    }

    fn initial_phase(&mut self, time: f64, dt: f64, gravity: DVec3, report: &mut TickReport) {
        for (robot, callbacks) in self.robots.iter_mut().zip(&mut self.callbacks) {
            robot.reset_delta_velocities();
            if let Some(controller) = callbacks.controller.as_mut() {
                controller.do_control(time, robot);
            }
            for plugin in &mut callbacks.plugins {
                plugin.do_science(dt, gravity, robot);
            }
            if let Some(pivot) = self.forward_dynamics.compute(robot, gravity) {
                report
                    .degradations
                    .push(Degradation::NumericalInstability { group: None, pivot });
            }
        }
    }

    fn detect_collisions(&mut self) {
        self.collisions.clear();
        self.detector.detect(
            &mut self.robots,
            &self.terrain,
            &self.contact_parameters,
            &mut self.collisions,
        );
    }

    fn configure_collision_handlers(&mut self) {
        // Side A of every collision is a robot, so each one yields an edge.
        self.edges.clear();
        self.edges
            .extend(self.collisions.values().iter().filter_map(Collision::edge));
        self.islands.build_groups(self.robots.len(), &self.edges);
    }

    fn handle_collisions(&mut self, dt: f64, report: &mut TickReport) {
        let partition = self.islands.partition();
        let collisions = self.collisions.values();
        let mut solutions = solve_groups(
            &partition.groups,
            &self.robots,
            collisions,
            &self.contact_parameters,
            &self.constraint_parameters,
            &self.solver_parameters,
            dt,
            self.parallel_enabled,
        );
        solutions.extend(partition.uncovered.iter().filter_map(|&robot| {
            solve_joint_limits(
                &self.robots[robot],
                &self.contact_parameters,
                &self.constraint_parameters,
                &self.solver_parameters,
                dt,
            )
        }));

        self.contact_impulses.clear();
        for solution in solutions {
            solution.write_joint_delta_velocities(&mut self.robots);
            report.solver_iterations = report.solver_iterations.max(solution.iterations);
            self.contact_impulses.extend(solution.contact_impulses);
            report.degradations.extend(solution.degradations);
        }
    }

    fn final_phase(&mut self, dt: f64) {
        for robot in &mut self.robots {
            self.integrator.integrate(robot, dt);
            robot.update_sensors(dt);
            robot.clear_external_wrenches();
            if robot.has_non_finite_state() {
                log::error!("robot '{}' has a non-finite state", robot.name());
            }
        }
    }

    fn record_degradations(&mut self, degradations: &[Degradation]) {
        for degradation in degradations {
            match degradation {
                Degradation::Nonconvergence {
                    group,
                    iterations,
                    residual,
                } => {
                    self.registry.increment("nonconvergence_count", 1.0);
                    if self.nonconvergence_warned {
                        log::debug!(
                            "group {group} did not converge in {iterations} iterations (residual {residual:e})"
                        );
                    } else {
                        self.nonconvergence_warned = true;
                        log::warn!(
                            "group {group} did not converge in {iterations} iterations (residual {residual:e}); further occurrences are logged at debug level"
                        );
                    }
                }
                Degradation::NumericalInstability { group, pivot } => {
                    self.registry.increment("numerical_instability_count", 1.0);
                    log::debug!("regularized singular inertia in group {group:?} (pivot {pivot:e})");
                }
            }
        }
    }

    pub fn set_global_contact_parameters(&mut self, parameters: ContactParameters) -> Result<()> {
        parameters.validate()?;
        self.contact_parameters = parameters;
        Ok(())
    }

    pub fn set_global_constraint_parameters(
        &mut self,
        parameters: ConstraintParameters,
    ) -> Result<()> {
        parameters.validate()?;
        self.constraint_parameters = parameters;
        Ok(())
    }

    pub fn set_solver_parameters(&mut self, parameters: SolverParameters) -> Result<()> {
        parameters.validate()?;
        self.solver_parameters = parameters;
        Ok(())
    }

    pub fn contact_parameters(&self) -> &ContactParameters {
        &self.contact_parameters
    }

    pub fn constraint_parameters(&self) -> &ConstraintParameters {
        &self.constraint_parameters
    }

    pub fn solver_parameters(&self) -> &SolverParameters {
        &self.solver_parameters
    }

    /// Solves collision groups on the rayon pool. Ignored without the
    /// `parallel` feature.
    pub fn set_parallel_enabled(&mut self, enabled: bool) {
        self.parallel_enabled = enabled;
    }

    pub fn parallel_enabled(&self) -> bool {
        self.parallel_enabled
    }

    pub fn robots(&self) -> &[Robot] {
        &self.robots
    }

    pub fn robot(&self, handle: RobotHandle) -> Result<&Robot> {
        self.robots
            .get(handle.0)
            .ok_or(PhysicsError::Misuse(MisuseError::UnknownRobot(handle.0)))
    }

    /// Direct state access between ticks, e.g. to apply a disturbance.
    pub fn robot_mut(&mut self, handle: RobotHandle) -> Result<&mut Robot> {
        self.robots
            .get_mut(handle.0)
            .ok_or(PhysicsError::Misuse(MisuseError::UnknownRobot(handle.0)))
    }

    pub fn robot_definitions(&self) -> &[RobotDefinition] {
        &self.robot_definitions
    }

    pub fn terrain_object_definitions(&self) -> &[TerrainObjectDefinition] {
        &self.terrain_object_definitions
    }

    /// Collisions of the last tick.
    pub fn collisions(&self) -> &[Collision] {
        self.collisions.values()
    }

    /// Contact impulses applied in the last tick.
    pub fn contact_impulses(&self) -> &[ContactImpulse] {
        &self.contact_impulses
    }

    /// Collision groups of the last tick.
    pub fn partition(&self) -> &Partition {
        self.islands.partition()
    }

    pub fn profiler(&self) -> &PhysicsProfiler {
        &self.profiler
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Solves every group against a shared read-only view of the robots.
///
/// Results come back in group order whether or not the pool is used.
#[allow(clippy::too_many_arguments)]
fn solve_groups(
    groups: &[CollisionGroup],
    robots: &[Robot],
    collisions: &[Collision],
    contact: &ContactParameters,
    constraint: &ConstraintParameters,
    solver: &SolverParameters,
    dt: f64,
    parallel: bool,
) -> Vec<GroupSolution> {
    let solve = |(index, group): (usize, &CollisionGroup)| {
        solve_group(index, group, robots, collisions, contact, constraint, solver, dt)
    };
    #[cfg(feature = "parallel")]
    if parallel && groups.len() > 1 {
        return groups.par_iter().enumerate().map(solve).collect();
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;
    groups.iter().enumerate().map(solve).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DEFAULT_GRAVITY,
        core::{
            collider::Shape,
            types::{MassProperties, Pose},
        },

    };
    use approx::assert_relative_eq;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    fn ball(name: &str, height: f64) -> RobotDefinition {
        RobotDefinition::floating_body(
            name,
            MassProperties::solid_sphere(1.0, 0.1),
            Some(Shape::sphere(0.1)),
            Pose::from_position(DVec3::new(0.0, 0.0, height)),
        )
    }

    #[test]
    fn simulate_before_initialize_is_misuse() {
        let mut engine = PhysicsEngine::new();
        assert_eq!(
            engine.simulate(0.0, 1e-3, DEFAULT_GRAVITY),
            Err(PhysicsError::Misuse(MisuseError::NotInitialized))
        );
    }

    #[test]
    fn invalid_time_steps_are_rejected() {
        let mut engine = PhysicsEngine::new();
        assert!(engine.initialize(DEFAULT_GRAVITY));
        for dt in [0.0, -1e-3, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                engine.simulate(0.0, dt, DEFAULT_GRAVITY),
                Err(PhysicsError::Misuse(MisuseError::InvalidTimeStep(_)))
            ));
        }
    }

    #[test]
    fn initialize_only_runs_once() {
        let mut engine = PhysicsEngine::new();
        assert!(engine.initialize(DEFAULT_GRAVITY));
        assert!(!engine.initialize(DEFAULT_GRAVITY));
    }

    #[test]
    fn duplicate_robot_names_are_rejected() {
        let mut engine = PhysicsEngine::new();
        engine.add_robot(ball("a", 1.0)).unwrap();
        assert_eq!(
            engine.add_robot(ball("a", 2.0)),
            Err(PhysicsError::Configuration(ConfigurationError::DuplicateRobot(
                "a".to_string()
            )))
        );
        assert_eq!(engine.robots().len(), 1);
        assert_eq!(engine.robot_definitions().len(), 1);
    }

    #[test]
    fn invalid_parameters_leave_the_previous_ones_in_place() {
        let mut engine = PhysicsEngine::new();
        let result =
            engine.set_global_contact_parameters(ContactParameters::default().with_friction(-1.0));
        assert!(matches!(result, Err(PhysicsError::Configuration(_))));
        assert_eq!(*engine.contact_parameters(), ContactParameters::default());
    }

    #[test]
    fn unknown_handle_is_misuse() {
        let engine = PhysicsEngine::new();
        assert!(matches!(
            engine.robot(RobotHandle(3)),
            Err(PhysicsError::Misuse(MisuseError::UnknownRobot(3)))
        ));
    }

    struct CountingController {
        initialized: Arc<AtomicUsize>,
        ticks: Arc<AtomicUsize>,
    }

    impl Controller for CountingController {
        fn initialize(&mut self, _robot: &Robot, registry: &Registry) {
            registry.set("ready", 1.0);
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }

        fn do_control(&mut self, _time: f64, _robot: &mut Robot) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn controllers_run_once_per_tick_and_publish_into_their_scope() {
        let initialized = Arc::new(AtomicUsize::new(0));
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut engine = PhysicsEngine::new();
        engine
            .add_robot_with(
                ball("ball", 1.0),
                RobotAttachments::new().with_controller(CountingController {
                    initialized: Arc::clone(&initialized),
                    ticks: Arc::clone(&ticks),
                }),
            )
            .unwrap();
        engine.initialize(DEFAULT_GRAVITY);
        for i in 0..5 {
            engine.simulate(i as f64 * 1e-3, 1e-3, DEFAULT_GRAVITY).unwrap();
        }
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
        assert_eq!(
            engine.registry().get("robots.ball.controller.ready"),
            Some(1.0)
        );
        assert!(engine.registry().get("total_timer").is_some());
    }

    #[test]
    fn plugin_forces_enter_forward_dynamics() {
        let mut engine = PhysicsEngine::new();
        let handle = engine
            .add_robot_with(
                ball("ball", 1.0),
                RobotAttachments::new().with_plugin(|_dt: f64, g: DVec3, robot: &mut Robot| {
                    let body = &mut robot.bodies[1];
                    let mass = body.mass();
                    let com = body.center_of_mass_world();
                    body.apply_force_world(-g * mass, com);
                }),
            )
            .unwrap();
        engine.initialize(DEFAULT_GRAVITY);
        for i in 0..100 {
            engine.simulate(i as f64 * 1e-3, 1e-3, DEFAULT_GRAVITY).unwrap();
        }
        let joint = engine.robot(handle).unwrap().six_dof_joint("ball_floating").unwrap();
        assert_relative_eq!(joint.pose.position.z, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn ball_on_ground_forms_one_group() {
        let mut engine = PhysicsEngine::new();
        engine.add_terrain_object(TerrainObjectDefinition::flat_ground(0.0)).unwrap();
        engine.add_robot(ball("resting", 0.0999)).unwrap();
        engine.add_robot(ball("flying", 3.0)).unwrap();
        engine.initialize(DEFAULT_GRAVITY);
        let report = engine.simulate(0.0, 1e-3, DEFAULT_GRAVITY).unwrap();
        assert_eq!(report.collision_count, 1);
        assert_eq!(report.group_count, 1);
        assert_eq!(report.uncovered_robot_count, 1);
        assert_eq!(engine.partition().groups[0].robots, vec![0]);
        assert_eq!(engine.contact_impulses().len(), 1);
        // The ground (side B) is pushed down along the A-to-B normal.
        assert!(engine.contact_impulses()[0].normal_component() > 0.0);
    }
}
