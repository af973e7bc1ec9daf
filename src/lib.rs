//! Impulse Dynamics – articulated multi-robot rigid-body simulation.
//!
//! Robots are trees of rigid bodies connected by fixed, one-DoF, coupled and
//! floating joints. Each tick the [`PhysicsEngine`] runs the controllers,
//! computes unconstrained accelerations with the articulated-body algorithm,
//! detects contacts against other robots and static terrain, partitions the
//! robots into collision groups, resolves contacts and joint limits with an
//! iterative impulse method, and integrates the joint state.

pub mod collision;
pub mod config;
pub mod controller;
pub mod core;
pub mod dynamics;
pub mod engine;
pub mod error;
pub mod utils;

pub use glam::{DQuat, DVec3};

pub use collision::{CollidableId, Collision, ContactImpulse, ContactPoint};
pub use config::{ConstraintParameters, ContactParameters, SolverParameters};
pub use controller::{Controller, InitialStateProvider, PhysicsPlugin, RobotAttachments};
pub use crate::core::{
    collider::{CollisionFilter, Shape},
    definition::{
        CollisionShapeDefinition, CoupledJointDefinition, JointDefinition, JointKindDefinition,
        JointStateDefinition, OneDofJointDefinition, RigidBodyDefinition, RobotDefinition,
        TerrainObjectDefinition,
    },
    joint::{Joint, JointKind},
    robot::Robot,
    sensor::{ImuSensor, ImuSensorDefinition},
    types::{MassProperties, Pose},
};
pub use engine::{PhysicsEngine, RobotHandle, TickReport};
pub use error::{ConfigurationError, Degradation, MisuseError, PhysicsError, Result};
pub use utils::{registry::Registry, spatial::SpatialVec};
