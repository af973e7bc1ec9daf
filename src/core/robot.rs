use std::collections::BTreeMap;

use glam::DVec3;

use super::{
    collider::{Collidable, CollidableOwner},
    definition::{JointKindDefinition, JointStateDefinition, RobotDefinition},
    joint::{
        CoupledJoint, HasConfiguration, HasVelocity, Joint, JointKind, OneDofJoint, OneDofKind,
        SixDofJoint,
    },
    rigidbody::RigidBody,
    sensor::ImuSensor,
    types::Pose,
};
use crate::{error::ConfigurationError, utils::spatial::SpatialVec};

/// A tree of rigid bodies connected by joints, rooted at a fixed body.
///
/// Bodies and joints are stored in topological order: every joint's
/// predecessor appears before its successor, and body 0 is the root.
#[derive(Debug, Clone)]
pub struct Robot {
    name: String,
    index: usize,
    pub bodies: Vec<RigidBody>,
    pub joints: Vec<Joint>,
    pub collidables: Vec<Collidable>,
    imu_sensors: Vec<ImuSensor>,
    self_collision: bool,
    dof_count: usize,
    initial_states: Vec<Option<JointStateDefinition>>,
    joint_lookup: BTreeMap<String, usize>,
    body_lookup: BTreeMap<String, usize>,
}

impl Robot {
    /// Builds the tree from a validated definition.
    pub fn from_definition(
        definition: &RobotDefinition,
        index: usize,
    ) -> Result<Self, ConfigurationError> {
        definition.validate()?;

        let def_body_index: BTreeMap<&str, usize> = definition
            .bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.as_str(), i))
            .collect();
        let mut child_joints: Vec<Vec<usize>> = vec![Vec::new(); definition.bodies.len()];
        for (j, joint) in definition.joints.iter().enumerate() {
            child_joints[def_body_index[joint.parent_body.as_str()]].push(j);
        }

        let root_def = def_body_index[definition.root_body.as_str()];
        let mut bodies = vec![RigidBody::new(
            definition.bodies[root_def].name.clone(),
            definition.bodies[root_def].mass_properties,
        )];
        let mut joints = Vec::with_capacity(definition.joints.len());
        let mut initial_states = Vec::with_capacity(definition.joints.len());
        let mut body_order = vec![root_def];
        let mut dof_count = 0;

        // Depth-first, keeping definition order among siblings.
        let mut stack: Vec<(usize, usize)> = child_joints[root_def]
            .iter()
            .rev()
            .map(|&j| (j, 0))
            .collect();
        while let Some((def_joint, parent_index)) = stack.pop() {
            let joint_def = &definition.joints[def_joint];
            let child_def = def_body_index[joint_def.child_body.as_str()];
            let child_index = bodies.len();
            let joint_index = joints.len();

            let mut body = RigidBody::new(
                definition.bodies[child_def].name.clone(),
                definition.bodies[child_def].mass_properties,
            );
            body.parent_joint = Some(joint_index);
            bodies.push(body);
            bodies[parent_index].child_joints.push(joint_index);
            body_order.push(child_def);

            let kind = build_joint_kind(&joint_def.kind);
            let joint = Joint {
                name: joint_def.name.clone(),
                predecessor: parent_index,
                successor: child_index,
                frame_in_parent: Pose::new(
                    joint_def.frame_in_parent.position,
                    joint_def.frame_in_parent.orientation.normalize(),
                ),
                kind,
                ignored: joint_def.ignored,
                velocity_offset: dof_count,
            };
            dof_count += joint.active_dofs();
            joints.push(joint);
            initial_states.push(joint_def.initial_state);

            for &grandchild in child_joints[child_def].iter().rev() {
                stack.push((grandchild, child_index));
            }
        }

        let mut collidables = Vec::new();
        let mut imu_sensors = Vec::new();
        for (body_index, &def_index) in body_order.iter().enumerate() {
            imu_sensors.extend(
                definition.bodies[def_index]
                    .imu_sensors
                    .iter()
                    .map(|sensor| ImuSensor::new(sensor, body_index)),
            );
            for shape in &definition.bodies[def_index].collision_shapes {
                collidables.push(Collidable::new(
                    CollidableOwner::Robot {
                        robot: index,
                        body: body_index,
                    },
                    shape.pose,
                    shape.shape.clone(),
                    shape.filter,
                ));
            }
        }

        let joint_lookup = joints
            .iter()
            .enumerate()
            .map(|(i, j)| (j.name.clone(), i))
            .collect();
        let body_lookup = bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i))
            .collect();

        let mut robot = Self {
            name: definition.name.clone(),
            index,
            bodies,
            joints,
            collidables,
            imu_sensors,
            self_collision: definition.self_collision,
            dof_count,
            initial_states,
            joint_lookup,
            body_lookup,
        };
        robot.apply_initial_state();
        Ok(robot)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Position of this robot in the engine.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of generalized velocity coordinates that take part in dynamics.
    pub fn dof_count(&self) -> usize {
        self.dof_count
    }

    pub fn self_collision(&self) -> bool {
        self.self_collision
    }

    /// Joints simulated by the engine, in tree order: ignored and fixed joints are excluded.
    pub fn joints_to_consider(&self) -> impl Iterator<Item = &Joint> {
        self.joints.iter().filter(|j| j.active_dofs() > 0)
    }

    pub fn joint_index(&self, name: &str) -> Option<usize> {
        self.joint_lookup.get(name).copied()
    }

    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joint_index(name).map(|i| &self.joints[i])
    }

    pub fn joint_mut(&mut self, name: &str) -> Option<&mut Joint> {
        self.joint_index(name).map(move |i| &mut self.joints[i])
    }

    pub fn body_index(&self, name: &str) -> Option<usize> {
        self.body_lookup.get(name).copied()
    }

    pub fn body(&self, name: &str) -> Option<&RigidBody> {
        self.body_index(name).map(|i| &self.bodies[i])
    }

    pub fn body_mut(&mut self, name: &str) -> Option<&mut RigidBody> {
        self.body_index(name).map(move |i| &mut self.bodies[i])
    }

    /// Scalar joint accessor; `None` if the joint is missing or not one-DoF.
    pub fn one_dof_joint_mut(&mut self, name: &str) -> Option<&mut OneDofJoint> {
        match &mut self.joint_mut(name)?.kind {
            JointKind::OneDof(joint) => Some(joint),
            _ => None,
        }
    }

    pub fn one_dof_joint(&self, name: &str) -> Option<&OneDofJoint> {
        match &self.joint(name)?.kind {
            JointKind::OneDof(joint) => Some(joint),
            _ => None,
        }
    }

    pub fn six_dof_joint(&self, name: &str) -> Option<&SixDofJoint> {
        match &self.joint(name)?.kind {
            JointKind::SixDof(joint) => Some(joint),
            _ => None,
        }
    }

    pub fn six_dof_joint_mut(&mut self, name: &str) -> Option<&mut SixDofJoint> {
        match &mut self.joint_mut(name)?.kind {
            JointKind::SixDof(joint) => Some(joint),
            _ => None,
        }
    }

    /// Overrides the initial state of a joint; used by initial state providers.
    pub fn set_initial_state(&mut self, joint: &str, state: JointStateDefinition) -> bool {
        let Some(index) = self.joint_index(joint) else {
            return false;
        };
        let compatible = matches!(
            (&self.joints[index].kind, &state),
            (JointKind::SixDof(_), JointStateDefinition::SixDof { .. })
                | (
                    JointKind::OneDof(_) | JointKind::Coupled(_),
                    JointStateDefinition::OneDof { .. }
                )
        );
        if compatible {
            self.initial_states[index] = Some(state);
        }
        compatible
    }

    /// Resets every joint to its initial state and refreshes kinematics.
    pub fn apply_initial_state(&mut self) {
        for (joint, state) in self.joints.iter_mut().zip(&self.initial_states) {
            match (&mut joint.kind, state) {
                (JointKind::OneDof(j), Some(JointStateDefinition::OneDof { q, qd, tau })) => {
                    j.set_configuration(*q);
                    j.set_velocity(*qd);
                    j.tau = *tau;
                }
                (JointKind::Coupled(j), Some(JointStateDefinition::OneDof { q, qd, tau })) => {
                    j.set_configuration(*q);
                    j.set_velocity(*qd);
                    j.tau = *tau;
                }
                (JointKind::SixDof(j), Some(JointStateDefinition::SixDof { pose, twist })) => {
                    j.set_configuration(*pose);
                    j.set_velocity(*twist);
                }
                _ => {}
            }
            if joint.ignored {
                joint.kind.zero_motion();
            }
        }
        for body in &mut self.bodies {
            body.clear_external_wrench();
            body.acceleration = SpatialVec::ZERO;
        }
        self.update_kinematics();
    }

    pub fn imu_sensors(&self) -> &[ImuSensor] {
        &self.imu_sensors
    }

    pub fn imu_sensor(&self, name: &str) -> Option<&ImuSensor> {
        self.imu_sensors.iter().find(|s| s.name() == name)
    }

    /// Sensor readings from the current forward-dynamics accelerations.
    pub fn initialize_sensors(&mut self) {
        for sensor in &mut self.imu_sensors {
            sensor.measure_instantaneous(&self.bodies[sensor.body()]);
        }
    }

    /// Sensor readings at the end of a tick of `dt`.
    pub fn update_sensors(&mut self, dt: f64) {
        for sensor in &mut self.imu_sensors {
            sensor.measure_tick(&self.bodies[sensor.body()], dt);
        }
    }

    /// Refreshes world poses and body twists from the joint state (root at world origin).
    pub fn update_kinematics(&mut self) {
        self.bodies[0].pose = Pose::IDENTITY;
        self.bodies[0].twist = SpatialVec::ZERO;
        for joint in &self.joints {
            let parent_pose = self.bodies[joint.predecessor].pose;
            let parent_twist = self.bodies[joint.predecessor].twist;
            let x = joint.successor_in_predecessor();
            let child = &mut self.bodies[joint.successor];
            child.pose = parent_pose.combine(&joint.successor_pose());
            child.twist = x.motion_to_child(parent_twist) + joint.relative_twist();
        }
    }

    /// Moves collidables to their bodies' current poses and refreshes their bounds.
    pub fn update_collidables(&mut self) {
        for collidable in &mut self.collidables {
            if let CollidableOwner::Robot { body, .. } = collidable.owner {
                collidable.update(&self.bodies[body].pose);
            }
        }
    }

    pub fn generalized_velocity(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.dof_count];
        for joint in self.joints_to_consider() {
            let n = joint.active_dofs();
            joint
                .kind
                .velocity_into(&mut out[joint.velocity_offset..joint.velocity_offset + n]);
        }
        out
    }

    pub fn set_generalized_velocity(&mut self, qd: &[f64]) {
        for joint in self.joints.iter_mut().filter(|j| j.active_dofs() > 0) {
            let n = joint.active_dofs();
            joint
                .kind
                .set_velocity_from(&qd[joint.velocity_offset..joint.velocity_offset + n]);
        }
    }

    pub fn generalized_acceleration(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.dof_count];
        for joint in self.joints_to_consider() {
            let n = joint.active_dofs();
            joint
                .kind
                .acceleration_into(&mut out[joint.velocity_offset..joint.velocity_offset + n]);
        }
        out
    }

    pub fn set_generalized_acceleration(&mut self, qdd: &[f64]) {
        for joint in self.joints.iter_mut().filter(|j| j.active_dofs() > 0) {
            let n = joint.active_dofs();
            joint
                .kind
                .set_acceleration_from(&qdd[joint.velocity_offset..joint.velocity_offset + n]);
        }
    }

    /// Generalized effort after actuator saturation and damping.
    pub fn generalized_effort(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.dof_count];
        for joint in self.joints_to_consider() {
            let n = joint.active_dofs();
            joint
                .kind
                .effective_effort_into(&mut out[joint.velocity_offset..joint.velocity_offset + n]);
        }
        out
    }

    /// Adds a generalized velocity change into each joint's delta channel.
    pub fn add_delta_velocities(&mut self, delta: &[f64]) {
        for joint in self.joints.iter_mut().filter(|j| j.active_dofs() > 0) {
            let n = joint.active_dofs();
            let offset = joint.velocity_offset;
            if let Some(channel) = joint.kind.delta_velocity_mut() {
                channel.add_delta_velocity(&delta[offset..offset + n]);
            }
        }
    }

    pub fn delta_velocities(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.dof_count];
        for joint in self.joints_to_consider() {
            let n = joint.active_dofs();
            if let Some(channel) = joint.kind.delta_velocity() {
                channel.delta_velocity(&mut out[joint.velocity_offset..joint.velocity_offset + n]);
            }
        }
        out
    }

    pub fn reset_delta_velocities(&mut self) {
        for joint in &mut self.joints {
            if let Some(channel) = joint.kind.delta_velocity_mut() {
                channel.reset_delta_velocity();
            }
        }
    }

    pub fn clear_external_wrenches(&mut self) {
        for body in &mut self.bodies {
            body.clear_external_wrench();
        }
    }

    /// Parent body index, `None` for the root.
    pub fn parent_body(&self, body: usize) -> Option<usize> {
        self.bodies[body]
            .parent_joint
            .map(|j| self.joints[j].predecessor)
    }

    /// True when one body is the direct parent of the other.
    pub fn are_adjacent(&self, a: usize, b: usize) -> bool {
        self.parent_body(a) == Some(b) || self.parent_body(b) == Some(a)
    }

    /// Joints between `body` and the root, nearest first.
    pub fn support_joints(&self, body: usize) -> impl Iterator<Item = &Joint> {
        let mut current = self.bodies[body].parent_joint;
        std::iter::from_fn(move || {
            let joint = &self.joints[current?];
            current = self.bodies[joint.predecessor].parent_joint;
            Some(joint)
        })
    }

    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(RigidBody::mass).sum()
    }

    pub fn center_of_mass(&self) -> DVec3 {
        let mass = self.total_mass();
        if mass <= 0.0 {
            return DVec3::ZERO;
        }
        self.bodies
            .iter()
            .map(|b| b.center_of_mass_world() * b.mass())
            .sum::<DVec3>()
            / mass
    }

    pub fn kinetic_energy(&self) -> f64 {
        self.bodies.iter().map(RigidBody::kinetic_energy).sum()
    }

    /// True when any joint state went non-finite.
    pub fn has_non_finite_state(&self) -> bool {
        self.generalized_velocity().iter().any(|v| !v.is_finite())
            || self.bodies.iter().any(|b| !b.pose.is_finite())
    }
}

fn build_joint_kind(definition: &JointKindDefinition) -> JointKind {
    match definition {
        JointKindDefinition::Fixed => JointKind::Fixed,
        JointKindDefinition::Revolute(def) => JointKind::OneDof(OneDofJoint::new(
            OneDofKind::Revolute,
            def.axis.normalize(),
            def.actuation,
        )),
        JointKindDefinition::Prismatic(def) => JointKind::OneDof(OneDofJoint::new(
            OneDofKind::Prismatic,
            def.axis.normalize(),
            def.actuation,
        )),
        JointKindDefinition::SixDof => JointKind::SixDof(SixDofJoint::default()),
        JointKindDefinition::Coupled(def) => JointKind::Coupled(CoupledJoint::new(
            def.first_axis.normalize(),
            def.offset,
            def.second_axis.normalize(),
            def.ratio,
            def.actuation,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        collider::Shape,
        definition::{
            CollisionShapeDefinition, JointDefinition, OneDofJointDefinition, RigidBodyDefinition,
        },
        types::MassProperties,
    };
    use glam::DQuat;

    fn double_pendulum() -> RobotDefinition {
        let mut def = RobotDefinition::new("double");
        def.add_body(
            RigidBodyDefinition::new(
                "upper",
                MassProperties::slender_rod(1.0, 1.0, DVec3::new(0.5, 0.0, 0.0)),
            )
            .with_shape(CollisionShapeDefinition::new(Shape::capsule(0.05, 1.0))),
        );
        def.add_body(RigidBodyDefinition::new(
            "lower",
            MassProperties::slender_rod(1.0, 1.0, DVec3::new(0.5, 0.0, 0.0)),
        ));
        def.add_joint(
            JointDefinition::new(
                "shoulder",
                "root",
                "upper",
                JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::Z)),
            )
            .with_initial_state(JointStateDefinition::OneDof {
                q: std::f64::consts::FRAC_PI_2,
                qd: 1.0,
                tau: 0.0,
            }),
        );
        def.add_joint(
            JointDefinition::new(
                "elbow",
                "upper",
                "lower",
                JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::Z)),
            )
            .with_frame(Pose::from_position(DVec3::X)),
        );
        def
    }

    #[test]
    fn builds_topological_order() {
        let robot = Robot::from_definition(&double_pendulum(), 3).unwrap();
        assert_eq!(robot.bodies[0].name, "root");
        assert_eq!(robot.joints[0].name, "shoulder");
        assert_eq!(robot.joints[1].predecessor, 1);
        assert_eq!(robot.dof_count(), 2);
        assert_eq!(robot.joints_to_consider().count(), 2);
        assert_eq!(
            robot.collidables[0].owner,
            CollidableOwner::Robot { robot: 3, body: 1 }
        );
        assert!(robot.are_adjacent(1, 2));
        assert!(!robot.are_adjacent(0, 2));
        let chain: Vec<_> = robot.support_joints(2).map(|j| j.name.as_str()).collect();
        assert_eq!(chain, ["elbow", "shoulder"]);
    }

    #[test]
    fn forward_kinematics_places_elbow() {
        let robot = Robot::from_definition(&double_pendulum(), 0).unwrap();
        // Shoulder at 90 degrees about Z puts the elbow on +Y.
        let lower = robot.body("lower").unwrap();
        assert!(lower.pose.position.abs_diff_eq(DVec3::new(0.0, 1.0, 0.0), 1e-12));
        // Shoulder rate 1 rad/s moves the elbow origin along -X at 1 m/s.
        let v = lower.point_velocity_world(lower.pose.position);
        assert!(v.abs_diff_eq(DVec3::new(-1.0, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn floating_body_initial_pose_applies() {
        let pose = Pose::new(DVec3::new(0.0, 0.0, 2.0), DQuat::from_rotation_x(0.3));
        let def = RobotDefinition::floating_body(
            "ball",
            MassProperties::solid_sphere(1.0, 0.2),
            Some(Shape::sphere(0.2)),
            pose,
        );
        let mut robot = Robot::from_definition(&def, 0).unwrap();
        robot.update_collidables();
        assert_eq!(robot.dof_count(), 6);
        assert!(robot.bodies[1].pose.position.abs_diff_eq(pose.position, 1e-12));
        assert!(robot.collidables[0].aabb.min.z > 1.7);
    }

    #[test]
    fn ignored_joints_are_not_considered() {
        let mut def = double_pendulum();
        def.joints[1].ignored = true;
        let robot = Robot::from_definition(&def, 0).unwrap();
        assert_eq!(robot.dof_count(), 1);
        let names: Vec<_> = robot.joints_to_consider().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["shoulder"]);
    }

    #[test]
    fn delta_channel_round_trip() {
        let mut robot = Robot::from_definition(&double_pendulum(), 0).unwrap();
        robot.add_delta_velocities(&[0.5, -0.25]);
        robot.add_delta_velocities(&[0.5, 0.0]);
        assert_eq!(robot.delta_velocities(), vec![1.0, -0.25]);
        robot.reset_delta_velocities();
        assert_eq!(robot.delta_velocities(), vec![0.0, 0.0]);
    }
}
