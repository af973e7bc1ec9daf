//! Serializable descriptions of robots and terrain used to build engine state.
//!
//! Definitions are plain data. Parsing them from robot description formats
//! is left to the caller; [`RobotDefinition::validate`] checks everything the
//! dynamics needs before a robot is instantiated.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::{
    collider::{CollisionFilter, Shape},
    joint::{JointActuation, JointLimits},
    sensor::ImuSensorDefinition,
    types::{MassProperties, Pose},
};
use crate::{error::ConfigurationError, utils::spatial::SpatialVec};

/// A shape attached to a body (body frame) or to the world (terrain).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionShapeDefinition {
    pub pose: Pose,
    pub shape: Shape,
    #[serde(default)]
    pub filter: CollisionFilter,
}

impl CollisionShapeDefinition {
    pub fn new(shape: Shape) -> Self {
        Self {
            pose: Pose::IDENTITY,
            shape,
            filter: CollisionFilter::default(),
        }
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn with_filter(mut self, filter: CollisionFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidBodyDefinition {
    pub name: String,
    pub mass_properties: MassProperties,
    #[serde(default)]
    pub collision_shapes: Vec<CollisionShapeDefinition>,
    #[serde(default)]
    pub imu_sensors: Vec<ImuSensorDefinition>,
}

impl RigidBodyDefinition {
    pub fn new(name: impl Into<String>, mass_properties: MassProperties) -> Self {
        Self {
            name: name.into(),
            mass_properties,
            collision_shapes: Vec::new(),
            imu_sensors: Vec::new(),
        }
    }

    pub fn with_shape(mut self, shape: CollisionShapeDefinition) -> Self {
        self.collision_shapes.push(shape);
        self
    }

    pub fn with_imu(mut self, sensor: ImuSensorDefinition) -> Self {
        self.imu_sensors.push(sensor);
        self
    }
}

/// Revolute or prismatic joint parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneDofJointDefinition {
    pub axis: DVec3,
    #[serde(default)]
    pub actuation: JointActuation,
}

impl OneDofJointDefinition {
    pub fn new(axis: DVec3) -> Self {
        Self {
            axis,
            actuation: JointActuation::default(),
        }
    }

    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.actuation.position_limits = Some(JointLimits::new(lower, upper));
        self
    }

    pub fn with_velocity_limit(mut self, limit: f64) -> Self {
        self.actuation.velocity_limit = Some(limit);
        self
    }

    pub fn with_effort_limit(mut self, limit: f64) -> Self {
        self.actuation.effort_limit = Some(limit);
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.actuation.damping = damping;
        self
    }
}

/// Two revolute stages driven by a single actuated coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoupledJointDefinition {
    pub first_axis: DVec3,
    pub offset: DVec3,
    pub second_axis: DVec3,
    /// Second stage angle per unit of the actuated coordinate.
    pub ratio: f64,
    #[serde(default)]
    pub actuation: JointActuation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JointKindDefinition {
    Fixed,
    Revolute(OneDofJointDefinition),
    Prismatic(OneDofJointDefinition),
    SixDof,
    Coupled(CoupledJointDefinition),
}

/// Initial joint state in the joint's native representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JointStateDefinition {
    OneDof { q: f64, qd: f64, tau: f64 },
    SixDof { pose: Pose, twist: SpatialVec },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDefinition {
    pub name: String,
    pub parent_body: String,
    pub child_body: String,
    /// Joint frame in the parent body frame.
    #[serde(default)]
    pub frame_in_parent: Pose,
    pub kind: JointKindDefinition,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub initial_state: Option<JointStateDefinition>,
}

impl JointDefinition {
    pub fn new(
        name: impl Into<String>,
        parent_body: impl Into<String>,
        child_body: impl Into<String>,
        kind: JointKindDefinition,
    ) -> Self {
        Self {
            name: name.into(),
            parent_body: parent_body.into(),
            child_body: child_body.into(),
            frame_in_parent: Pose::IDENTITY,
            kind,
            ignored: false,
            initial_state: None,
        }
    }

    pub fn with_frame(mut self, frame_in_parent: Pose) -> Self {
        self.frame_in_parent = frame_in_parent;
        self
    }

    pub fn with_initial_state(mut self, state: JointStateDefinition) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Full description of a robot tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotDefinition {
    pub name: String,
    /// Name of the fixed root body.
    pub root_body: String,
    pub bodies: Vec<RigidBodyDefinition>,
    pub joints: Vec<JointDefinition>,
    /// Allow collisions between bodies of this robot that are not parent and child.
    #[serde(default)]
    pub self_collision: bool,
}

impl RobotDefinition {
    /// Starts a definition with a massless fixed root body called `"root"`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_body: "root".to_string(),
            bodies: vec![RigidBodyDefinition::new("root", MassProperties::massless())],
            joints: Vec::new(),
            self_collision: false,
        }
    }

    pub fn add_body(&mut self, body: RigidBodyDefinition) -> &mut Self {
        self.bodies.push(body);
        self
    }

    pub fn add_joint(&mut self, joint: JointDefinition) -> &mut Self {
        self.joints.push(joint);
        self
    }

    pub fn with_self_collision(mut self, enabled: bool) -> Self {
        self.self_collision = enabled;
        self
    }

    /// Single free-floating body attached to the root by a six-DoF joint.
    pub fn floating_body(
        name: impl Into<String>,
        mass_properties: MassProperties,
        shape: Option<Shape>,
        initial_pose: Pose,
    ) -> Self {
        let name = name.into();
        let body_name = format!("{name}_body");
        let mut body = RigidBodyDefinition::new(body_name.clone(), mass_properties);
        if let Some(shape) = shape {
            body = body.with_shape(CollisionShapeDefinition::new(shape));
        }
        let mut definition = Self::new(name.clone());
        definition.add_body(body);
        definition.add_joint(
            JointDefinition::new(
                format!("{name}_floating"),
                "root",
                body_name,
                JointKindDefinition::SixDof,
            )
            .with_initial_state(JointStateDefinition::SixDof {
                pose: initial_pose,
                twist: SpatialVec::ZERO,
            }),
        );
        definition
    }

    pub fn body(&self, name: &str) -> Option<&RigidBodyDefinition> {
        self.bodies.iter().find(|b| b.name == name)
    }

    pub fn joint(&self, name: &str) -> Option<&JointDefinition> {
        self.joints.iter().find(|j| j.name == name)
    }

    /// Checks names, tree topology, mass properties, joints, and shapes.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut body_index = BTreeMap::new();
        for (i, body) in self.bodies.iter().enumerate() {
            if body_index.insert(body.name.as_str(), i).is_some() {
                return Err(self.duplicate("body", &body.name));
            }
        }
        let mut joint_names = BTreeSet::new();
        for joint in &self.joints {
            if !joint_names.insert(joint.name.as_str()) {
                return Err(self.duplicate("joint", &joint.name));
            }
        }

        let root = *body_index
            .get(self.root_body.as_str())
            .ok_or_else(|| ConfigurationError::UnknownBody {
                body: self.root_body.clone(),
                referrer: self.name.clone(),
            })?;

        let mut parent_of: Vec<Option<&str>> = vec![None; self.bodies.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); self.bodies.len()];
        for joint in &self.joints {
            let lookup = |body: &str| {
                body_index
                    .get(body)
                    .copied()
                    .ok_or_else(|| ConfigurationError::UnknownBody {
                        body: body.to_string(),
                        referrer: joint.name.clone(),
                    })
            };
            let parent = lookup(&joint.parent_body)?;
            let child = lookup(&joint.child_body)?;
            if child == root {
                return Err(self.not_a_tree(format!(
                    "joint '{}' makes the root body a child",
                    joint.name
                )));
            }
            if parent == child {
                return Err(self.not_a_tree(format!("joint '{}' connects a body to itself", joint.name)));
            }
            if let Some(existing) = parent_of[child] {
                return Err(self.not_a_tree(format!(
                    "body '{}' has two parent joints ('{}' and '{}')",
                    joint.child_body, existing, joint.name
                )));
            }
            parent_of[child] = Some(joint.name.as_str());
            children[parent].push(child);
            validate_joint(joint)?;
        }

        if children[root].is_empty() {
            return Err(ConfigurationError::RootWithoutJoints {
                robot: self.name.clone(),
                body: self.root_body.clone(),
            });
        }

        let mut reached = vec![false; self.bodies.len()];
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if std::mem::replace(&mut reached[node], true) {
                continue;
            }
            stack.extend(children[node].iter().copied());
        }
        if let Some(orphan) = reached.iter().position(|r| !r) {
            return Err(self.not_a_tree(format!(
                "body '{}' is not connected to the root",
                self.bodies[orphan].name
            )));
        }

        for (i, body) in self.bodies.iter().enumerate() {
            if i != root {
                let mass = body.mass_properties.mass;
                if !(mass > 0.0 && mass.is_finite()) {
                    return Err(ConfigurationError::InvalidMass {
                        body: body.name.clone(),
                        mass,
                    });
                }
                if !body.mass_properties.has_positive_definite_inertia()
                    || !body.mass_properties.center_of_mass.is_finite()
                {
                    return Err(ConfigurationError::InvalidInertia {
                        body: body.name.clone(),
                    });
                }
            }
            for shape in &body.collision_shapes {
                shape.shape.validate(&body.name)?;
            }
        }

        let mut sensor_names = BTreeSet::new();
        for sensor in self.bodies.iter().flat_map(|b| &b.imu_sensors) {
            if !sensor_names.insert(sensor.name.as_str()) {
                return Err(self.duplicate("sensor", &sensor.name));
            }
            if !sensor.mount.is_finite() {
                return Err(ConfigurationError::InvalidSensor {
                    sensor: sensor.name.clone(),
                    reason: "mount pose is not finite".to_string(),
                });
            }
        }
        Ok(())
    }

    fn duplicate(&self, kind: &'static str, name: &str) -> ConfigurationError {
        ConfigurationError::DuplicateName {
            robot: self.name.clone(),
            kind,
            name: name.to_string(),
        }
    }

    fn not_a_tree(&self, reason: String) -> ConfigurationError {
        ConfigurationError::NotATree {
            robot: self.name.clone(),
            reason,
        }
    }
}

fn validate_joint(joint: &JointDefinition) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidJoint {
        joint: joint.name.clone(),
        reason: reason.to_string(),
    };
    let unit_axis = |axis: DVec3| axis.is_finite() && axis.length_squared() > 1e-12;

    if !joint.frame_in_parent.is_finite() {
        return Err(invalid("joint frame is not finite"));
    }
    let actuation = match &joint.kind {
        JointKindDefinition::Fixed | JointKindDefinition::SixDof => None,
        JointKindDefinition::Revolute(def) | JointKindDefinition::Prismatic(def) => {
            if !unit_axis(def.axis) {
                return Err(invalid("axis must be non-zero"));
            }
            Some(&def.actuation)
        }
        JointKindDefinition::Coupled(def) => {
            if !unit_axis(def.first_axis) || !unit_axis(def.second_axis) {
                return Err(invalid("coupled axes must be non-zero"));
            }
            if !def.ratio.is_finite() || !def.offset.is_finite() {
                return Err(invalid("coupling ratio and offset must be finite"));
            }
            Some(&def.actuation)
        }
    };
    if let Some(actuation) = actuation {
        if let Some(limits) = actuation.position_limits {
            if !(limits.lower <= limits.upper) {
                return Err(invalid("lower position limit exceeds upper limit"));
            }
        }
        if actuation.velocity_limit.is_some_and(|v| !(v > 0.0)) {
            return Err(invalid("velocity limit must be > 0"));
        }
        if actuation.effort_limit.is_some_and(|v| !(v >= 0.0)) {
            return Err(invalid("effort limit must be >= 0"));
        }
        if !(actuation.damping >= 0.0 && actuation.damping.is_finite()) {
            return Err(invalid("damping must be >= 0"));
        }
    }
    match (&joint.kind, &joint.initial_state) {
        (_, None) => Ok(()),
        (JointKindDefinition::SixDof, Some(JointStateDefinition::SixDof { .. })) => Ok(()),
        (
            JointKindDefinition::Revolute(_)
            | JointKindDefinition::Prismatic(_)
            | JointKindDefinition::Coupled(_),
            Some(JointStateDefinition::OneDof { .. }),
        ) => Ok(()),
        _ => Err(invalid("initial state does not match the joint kind")),
    }
}

/// Static collidables with no dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainObjectDefinition {
    pub name: String,
    pub collision_shapes: Vec<CollisionShapeDefinition>,
}

impl TerrainObjectDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collision_shapes: Vec::new(),
        }
    }

    /// Infinite flat ground whose surface passes through `height` on the world Z axis.
    pub fn flat_ground(height: f64) -> Self {
        Self::new("ground").with_shape(
            CollisionShapeDefinition::new(Shape::Plane)
                .with_pose(Pose::from_position(DVec3::new(0.0, 0.0, height))),
        )
    }

    pub fn with_shape(mut self, shape: CollisionShapeDefinition) -> Self {
        self.collision_shapes.push(shape);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for shape in &self.collision_shapes {
            shape.shape.validate(&self.name)?;
            if !shape.pose.is_finite() {
                return Err(ConfigurationError::InvalidShape {
                    owner: self.name.clone(),
                    reason: "pose is not finite".to_string(),
                });
            }
        }
        Ok(())
    }
}
