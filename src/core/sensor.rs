//! Body-mounted inertial measurement units.
//!
//! Readings are ideal: no noise, bias or sampling. Orientation is given in
//! world coordinates; angular velocity and linear acceleration in the sensor
//! frame. The linear acceleration is the true acceleration of the mount
//! point, so a body at rest reads zero and a falling one reads gravity.

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::{rigidbody::RigidBody, types::Pose};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuSensorDefinition {
    pub name: String,
    /// Sensor frame expressed in the body frame.
    #[serde(default)]
    pub mount: Pose,
}

impl ImuSensorDefinition {
    pub fn new(name: impl Into<String>, mount: Pose) -> Self {
        Self {
            name: name.into(),
            mount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImuSensor {
    name: String,
    body: usize,
    mount: Pose,
    orientation: DQuat,
    angular_velocity: DVec3,
    linear_acceleration: DVec3,
    /// World velocity of the mount point at the last reading.
    point_velocity: DVec3,
}

impl ImuSensor {
    pub fn new(definition: &ImuSensorDefinition, body: usize) -> Self {
        Self {
            name: definition.name.clone(),
            body,
            mount: definition.mount,
            orientation: definition.mount.orientation,
            angular_velocity: DVec3::ZERO,
            linear_acceleration: DVec3::ZERO,
            point_velocity: DVec3::ZERO,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index of the carrying body in [`Robot::bodies`](crate::core::robot::Robot::bodies).
    pub fn body(&self) -> usize {
        self.body
    }

    pub fn mount(&self) -> Pose {
        self.mount
    }

    pub fn orientation(&self) -> DQuat {
        self.orientation
    }

    pub fn angular_velocity(&self) -> DVec3 {
        self.angular_velocity
    }

    pub fn linear_acceleration(&self) -> DVec3 {
        self.linear_acceleration
    }

    /// Reading straight from the body's forward-dynamics acceleration.
    ///
    /// Used before the first tick, when no velocity history exists.
    pub fn measure_instantaneous(&mut self, body: &RigidBody) {
        let offset = self.mount.position;
        let omega = body.twist.ang;
        let velocity = body.twist.lin + omega.cross(offset);
        let a = body.acceleration;
        let acceleration = a.lin + a.ang.cross(offset) + omega.cross(velocity);

        self.read_frame(body, velocity);
        self.linear_acceleration = self.mount.orientation.inverse() * acceleration;
    }

    /// Reading after a tick of `dt`: the acceleration is the change of the
    /// mount point velocity over the tick, contact impulses included.
    pub fn measure_tick(&mut self, body: &RigidBody, dt: f64) {
        let previous = self.point_velocity;
        let velocity = body.twist.lin + body.twist.ang.cross(self.mount.position);
        self.read_frame(body, velocity);
        let acceleration = (self.point_velocity - previous) / dt;
        self.linear_acceleration = self.orientation.inverse() * acceleration;
    }

    fn read_frame(&mut self, body: &RigidBody, body_velocity: DVec3) {
        self.orientation = (body.pose.orientation * self.mount.orientation).normalize();
        self.angular_velocity = self.mount.orientation.inverse() * body.twist.ang;
        self.point_velocity = body.pose.transform_vector(body_velocity);
    }
}
