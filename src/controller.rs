//! Per-robot extension points: controllers, physics plugins and initial
//! state providers.
//!
//! These are the only trait objects the engine calls into. Each is invoked
//! at a fixed point of the tick: controllers and plugins before forward
//! dynamics, initial state providers once when the robot is added.

use glam::DVec3;

use crate::{
    core::{definition::JointStateDefinition, joint::Joint, robot::Robot},
    utils::registry::Registry,
};

/// Writes joint efforts (and anything else it likes) before forward dynamics.
pub trait Controller: Send {
    /// Called once from [`PhysicsEngine::initialize`](crate::engine::PhysicsEngine::initialize).
    ///
    /// `registry` is scoped to this robot's controller.
    fn initialize(&mut self, robot: &Robot, registry: &Registry);

    /// Called once per tick, after the robot's state is final for the
    /// previous tick.
    fn do_control(&mut self, time: f64, robot: &mut Robot);

    fn pause(&mut self) {}
}

/// Custom force injection, typically through body external wrenches.
pub trait PhysicsPlugin: Send {
    fn do_science(&mut self, dt: f64, gravity: DVec3, robot: &mut Robot);
}

impl<F> PhysicsPlugin for F
where
    F: FnMut(f64, DVec3, &mut Robot) + Send,
{
    fn do_science(&mut self, dt: f64, gravity: DVec3, robot: &mut Robot) {
        self(dt, gravity, robot)
    }
}

/// Overrides the definition's initial joint states.
pub trait InitialStateProvider {
    /// `None` keeps the joint's own initial state.
    fn initial_state(&self, joint: &Joint) -> Option<JointStateDefinition>;
}

impl<F> InitialStateProvider for F
where
    F: Fn(&Joint) -> Option<JointStateDefinition>,
{
    fn initial_state(&self, joint: &Joint) -> Option<JointStateDefinition> {
        self(joint)
    }
}

/// Optional collaborators handed to
/// [`PhysicsEngine::add_robot_with`](crate::engine::PhysicsEngine::add_robot_with).
#[derive(Default)]
pub struct RobotAttachments {
    pub controller: Option<Box<dyn Controller>>,
    pub initial_state_provider: Option<Box<dyn InitialStateProvider>>,
    pub plugins: Vec<Box<dyn PhysicsPlugin>>,
}

impl RobotAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controller(mut self, controller: impl Controller + 'static) -> Self {
        self.controller = Some(Box::new(controller));
        self
    }

    pub fn with_initial_state_provider(
        mut self,
        provider: impl InitialStateProvider + 'static,
    ) -> Self {
        self.initial_state_provider = Some(Box::new(provider));
        self
    }

    pub fn with_plugin(mut self, plugin: impl PhysicsPlugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Applies the provider's states to `robot`, if there is a provider.
    pub(crate) fn apply_initial_states(&self, robot: &mut Robot) {
        let Some(provider) = &self.initial_state_provider else {
            return;
        };
        let states: Vec<(String, JointStateDefinition)> = robot
            .joints
            .iter()
            .filter_map(|joint| Some((joint.name.clone(), provider.initial_state(joint)?)))
            .collect();
        for (name, state) in states {
            if !robot.set_initial_state(&name, state) {
                log::warn!(
                    "initial state for joint '{}' of '{}' does not match its kind",
                    name,
                    robot.name()
                );
            }
        }
        robot.apply_initial_state();
    }
}

impl std::fmt::Debug for RobotAttachments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotAttachments")
            .field("controller", &self.controller.is_some())
            .field("initial_state_provider", &self.initial_state_provider.is_some())
            .field("plugins", &self.plugins.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        definition::{
            JointDefinition, JointKindDefinition, OneDofJointDefinition, RigidBodyDefinition,
            RobotDefinition,
        },
        joint::JointKind,
        types::MassProperties,
    };

    fn pendulum() -> Robot {
        let mut def = RobotDefinition::new("pendulum");
        def.add_body(RigidBodyDefinition::new("bob", MassProperties::solid_sphere(1.0, 0.1)))
            .add_joint(JointDefinition::new(
                "hinge",
                "root",
                "bob",
                JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::Y)),
            ));
        Robot::from_definition(&def, 0).unwrap()
    }

    #[test]
    fn provider_overrides_matching_joints() {
        let attachments =
            RobotAttachments::new().with_initial_state_provider(|joint: &Joint| {
                matches!(joint.kind, JointKind::OneDof(_)).then_some(
                    JointStateDefinition::OneDof {
                        q: 0.3,
                        qd: -1.0,
                        tau: 0.0,
                    },
                )
            });
        let mut robot = pendulum();
        attachments.apply_initial_states(&mut robot);
        let hinge = robot.one_dof_joint("hinge").unwrap();
        assert_eq!(hinge.q, 0.3);
        assert_eq!(hinge.qd, -1.0);
    }

    #[test]
    fn closures_are_plugins() {
        let mut plugin = |_dt: f64, g: DVec3, robot: &mut Robot| {
            let mass = robot.bodies[1].mass();
            let com = robot.bodies[1].center_of_mass_world();
            robot.bodies[1].apply_force_world(-g * mass, com);
        };
        let mut robot = pendulum();
        plugin.do_science(1e-3, DVec3::new(0.0, 0.0, -9.81), &mut robot);
        assert!(robot.bodies[1].external_wrench.lin.z > 0.0);
    }
}
