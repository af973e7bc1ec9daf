use glam::DVec3;

use super::types::{MassProperties, Pose};
use crate::utils::spatial::{SpatialInertia, SpatialMat, SpatialVec};

/// A rigid link of a robot tree.
///
/// Topology (`parent_joint`, `child_joints`) is fixed at construction; the
/// kinematic state is refreshed every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidBody {
    pub name: String,
    pub mass_properties: MassProperties,
    /// `None` for the robot's fixed root body.
    pub parent_joint: Option<usize>,
    pub child_joints: Vec<usize>,
    /// Body frame in world.
    pub pose: Pose,
    /// Velocity of the body frame, expressed in the body frame.
    pub twist: SpatialVec,
    /// Spatial acceleration of the body frame, expressed in the body frame.
    pub acceleration: SpatialVec,
    /// Wrench applied by physics plugins this tick, in the body frame.
    pub external_wrench: SpatialVec,
    spatial_inertia: SpatialMat,
}

impl RigidBody {
    pub fn new(name: impl Into<String>, mass_properties: MassProperties) -> Self {
        let spatial_inertia = SpatialInertia::new(
            mass_properties.mass,
            mass_properties.center_of_mass,
            mass_properties.inertia,
        )
        .to_mat();
        Self {
            name: name.into(),
            mass_properties,
            parent_joint: None,
            child_joints: Vec::new(),
            pose: Pose::IDENTITY,
            twist: SpatialVec::ZERO,
            acceleration: SpatialVec::ZERO,
            external_wrench: SpatialVec::ZERO,
            spatial_inertia,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_joint.is_none()
    }

    pub fn mass(&self) -> f64 {
        self.mass_properties.mass
    }

    /// 6x6 inertia about the body frame origin, in the body frame.
    pub fn spatial_inertia(&self) -> &SpatialMat {
        &self.spatial_inertia
    }

    pub fn center_of_mass_world(&self) -> DVec3 {
        self.pose.transform_point(self.mass_properties.center_of_mass)
    }

    pub fn angular_velocity_world(&self) -> DVec3 {
        self.pose.transform_vector(self.twist.ang)
    }

    /// World-frame velocity of a world-frame point rigidly attached to this body.
    pub fn point_velocity_world(&self, point: DVec3) -> DVec3 {
        let omega = self.angular_velocity_world();
        self.pose.transform_vector(self.twist.lin) + omega.cross(point - self.pose.position)
    }

    pub fn linear_velocity_of_com_world(&self) -> DVec3 {
        self.point_velocity_world(self.center_of_mass_world())
    }

    /// Adds a world-frame force acting at a world-frame point.
    pub fn apply_force_world(&mut self, force: DVec3, point: DVec3) {
        let f = self.pose.inverse_transform_vector(force);
        let r = self.pose.inverse_transform_point(point);
        self.external_wrench += SpatialVec::new(r.cross(f), f);
    }

    pub fn clear_external_wrench(&mut self) {
        self.external_wrench = SpatialVec::ZERO;
    }

    pub fn kinetic_energy(&self) -> f64 {
        0.5 * self.twist.dot(&self.spatial_inertia.mul_vec(self.twist))
    }
}
