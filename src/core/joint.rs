use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use super::types::Pose;
use crate::utils::spatial::{SpatialTransform, SpatialVec};

/// Lower and upper bound of a scalar joint coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub lower: f64,
    pub upper: f64,
}

impl JointLimits {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }
}

/// Actuator-side properties shared by scalar joints.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointActuation {
    pub position_limits: Option<JointLimits>,
    /// Maximum absolute joint speed.
    pub velocity_limit: Option<f64>,
    /// Maximum absolute actuator effort; larger commands are saturated.
    pub effort_limit: Option<f64>,
    /// Viscous damping coefficient.
    pub damping: f64,
}

impl JointActuation {
    /// Actuator effort after saturation and viscous damping.
    fn effective_effort(&self, tau: f64, qd: f64) -> f64 {
        let commanded = match self.effort_limit {
            Some(limit) => tau.clamp(-limit, limit),
            None => tau,
        };
        commanded - self.damping * qd
    }
}

/// Scalar motion type of a one-DoF joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OneDofKind {
    Revolute,
    Prismatic,
}

/// Revolute or prismatic joint about a unit axis of the joint frame.
#[derive(Debug, Clone, PartialEq)]
pub struct OneDofJoint {
    pub kind: OneDofKind,
    pub axis: DVec3,
    pub actuation: JointActuation,
    pub q: f64,
    pub qd: f64,
    pub qdd: f64,
    pub tau: f64,
    pub delta_qd: f64,
}

impl OneDofJoint {
    pub fn new(kind: OneDofKind, axis: DVec3, actuation: JointActuation) -> Self {
        Self {
            kind,
            axis,
            actuation,
            q: 0.0,
            qd: 0.0,
            qdd: 0.0,
            tau: 0.0,
            delta_qd: 0.0,
        }
    }

    fn subspace_column(&self) -> SpatialVec {
        match self.kind {
            OneDofKind::Revolute => SpatialVec::new(self.axis, DVec3::ZERO),
            OneDofKind::Prismatic => SpatialVec::new(DVec3::ZERO, self.axis),
        }
    }
}

/// Floating joint. Velocity is the successor body twist in its own frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SixDofJoint {
    /// Successor frame relative to the joint frame.
    pub pose: Pose,
    pub twist: SpatialVec,
    pub acceleration: SpatialVec,
    /// Wrench applied across the joint, in the successor frame.
    pub wrench: SpatialVec,
    pub delta_twist: SpatialVec,
}

/// Two revolute stages in series driven by one actuated coordinate.
///
/// Stage one rotates by `q` about `first_axis`, the frame is then shifted by
/// `offset`, and stage two rotates by `ratio * q` about `second_axis`.
#[derive(Debug, Clone, PartialEq)]
pub struct CoupledJoint {
    pub first_axis: DVec3,
    pub offset: DVec3,
    pub second_axis: DVec3,
    pub ratio: f64,
    pub actuation: JointActuation,
    pub q: f64,
    pub qd: f64,
    pub qdd: f64,
    pub tau: f64,
    pub delta_qd: f64,
}

impl CoupledJoint {
    pub fn new(
        first_axis: DVec3,
        offset: DVec3,
        second_axis: DVec3,
        ratio: f64,
        actuation: JointActuation,
    ) -> Self {
        Self {
            first_axis,
            offset,
            second_axis,
            ratio,
            actuation,
            q: 0.0,
            qd: 0.0,
            qdd: 0.0,
            tau: 0.0,
            delta_qd: 0.0,
        }
    }

    /// Angle of the derived second stage.
    pub fn derived_angle(&self) -> f64 {
        self.ratio * self.q
    }

    fn second_stage_rotation(&self) -> DMat3 {
        DMat3::from_axis_angle(self.second_axis, self.derived_angle())
    }

    fn subspace_column(&self) -> SpatialVec {
        let r2t = self.second_stage_rotation().transpose();
        SpatialVec::new(
            r2t * self.first_axis + self.second_axis * self.ratio,
            r2t * self.first_axis.cross(self.offset),
        )
    }

    /// Time derivative of the motion subspace times `qd`.
    fn bias_acceleration(&self) -> SpatialVec {
        let r2t = self.second_stage_rotation().transpose();
        let scale = -self.ratio * self.qd * self.qd;
        SpatialVec::new(
            self.second_axis.cross(r2t * self.first_axis) * scale,
            self.second_axis.cross(r2t * self.first_axis.cross(self.offset)) * scale,
        )
    }
}

/// Closed set of joint kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum JointKind {
    Fixed,
    OneDof(OneDofJoint),
    SixDof(SixDofJoint),
    Coupled(CoupledJoint),
}

/// Columns of a joint motion subspace, expressed in the successor frame.
#[derive(Debug, Clone, Copy)]
pub struct MotionSubspace {
    columns: [SpatialVec; 6],
    len: usize,
}

impl MotionSubspace {
    pub const EMPTY: Self = Self {
        columns: [SpatialVec::ZERO; 6],
        len: 0,
    };

    fn single(column: SpatialVec) -> Self {
        let mut out = Self::EMPTY;
        out.columns[0] = column;
        out.len = 1;
        out
    }

    fn identity() -> Self {
        let mut out = Self::EMPTY;
        for (i, column) in out.columns.iter_mut().enumerate() {
            *column = SpatialVec::unit(i);
        }
        out.len = 6;
        out
    }

    pub fn columns(&self) -> &[SpatialVec] {
        &self.columns[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `S * qd`
    pub fn apply(&self, qd: &[f64]) -> SpatialVec {
        self.columns()
            .iter()
            .zip(qd)
            .fold(SpatialVec::ZERO, |acc, (s, v)| acc + *s * *v)
    }
}

/// Read/write access to a joint configuration in its native representation.
pub trait HasConfiguration {
    type Configuration: Copy;

    fn configuration(&self) -> Self::Configuration;
    fn set_configuration(&mut self, q: Self::Configuration);
}

/// Read/write access to joint velocity and acceleration.
pub trait HasVelocity {
    type Velocity: Copy;

    fn velocity(&self) -> Self::Velocity;
    fn set_velocity(&mut self, qd: Self::Velocity);
    fn acceleration(&self) -> Self::Velocity;
    fn set_acceleration(&mut self, qdd: Self::Velocity);
}

/// Read/write access to the effort applied across the joint.
pub trait HasEffort {
    type Effort: Copy;

    fn effort(&self) -> Self::Effort;
    fn set_effort(&mut self, tau: Self::Effort);
}

/// Uniform per-DoF velocity change channel written by the impulse stage.
pub trait HasDeltaVelocity {
    fn dof_count(&self) -> usize;
    fn delta_velocity(&self, out: &mut [f64]);
    fn add_delta_velocity(&mut self, delta: &[f64]);
    fn reset_delta_velocity(&mut self);
}

macro_rules! scalar_joint_traits {
    ($ty:ty) => {
        impl HasConfiguration for $ty {
            type Configuration = f64;

            fn configuration(&self) -> f64 {
                self.q
            }

            fn set_configuration(&mut self, q: f64) {
                self.q = q;
            }
        }

        impl HasVelocity for $ty {
            type Velocity = f64;

            fn velocity(&self) -> f64 {
                self.qd
            }

            fn set_velocity(&mut self, qd: f64) {
                self.qd = qd;
            }

            fn acceleration(&self) -> f64 {
                self.qdd
            }

            fn set_acceleration(&mut self, qdd: f64) {
                self.qdd = qdd;
            }
        }

        impl HasEffort for $ty {
            type Effort = f64;

            fn effort(&self) -> f64 {
                self.tau
            }

            fn set_effort(&mut self, tau: f64) {
                self.tau = tau;
            }
        }

        impl HasDeltaVelocity for $ty {
            fn dof_count(&self) -> usize {
                1
            }

            fn delta_velocity(&self, out: &mut [f64]) {
                out[0] = self.delta_qd;
            }

            fn add_delta_velocity(&mut self, delta: &[f64]) {
                self.delta_qd += delta[0];
            }

            fn reset_delta_velocity(&mut self) {
                self.delta_qd = 0.0;
            }
        }
    };
}

scalar_joint_traits!(OneDofJoint);
scalar_joint_traits!(CoupledJoint);

impl HasConfiguration for SixDofJoint {
    type Configuration = Pose;

    fn configuration(&self) -> Pose {
        self.pose
    }

    fn set_configuration(&mut self, q: Pose) {
        self.pose = Pose::new(q.position, q.orientation.normalize());
    }
}

impl HasVelocity for SixDofJoint {
    type Velocity = SpatialVec;

    fn velocity(&self) -> SpatialVec {
        self.twist
    }

    fn set_velocity(&mut self, qd: SpatialVec) {
        self.twist = qd;
    }

    fn acceleration(&self) -> SpatialVec {
        self.acceleration
    }

    fn set_acceleration(&mut self, qdd: SpatialVec) {
        self.acceleration = qdd;
    }
}

impl HasEffort for SixDofJoint {
    type Effort = SpatialVec;

    fn effort(&self) -> SpatialVec {
        self.wrench
    }

    fn set_effort(&mut self, tau: SpatialVec) {
        self.wrench = tau;
    }
}

impl HasDeltaVelocity for SixDofJoint {
    fn dof_count(&self) -> usize {
        6
    }

    fn delta_velocity(&self, out: &mut [f64]) {
        out[..6].copy_from_slice(&self.delta_twist.to_array());
    }

    fn add_delta_velocity(&mut self, delta: &[f64]) {
        self.delta_twist += SpatialVec::from_slice(delta);
    }

    fn reset_delta_velocity(&mut self) {
        self.delta_twist = SpatialVec::ZERO;
    }
}

impl JointKind {
    pub fn dofs(&self) -> usize {
        match self {
            JointKind::Fixed => 0,
            JointKind::OneDof(_) | JointKind::Coupled(_) => 1,
            JointKind::SixDof(_) => 6,
        }
    }

    /// Placement of the successor frame in the joint frame for the current configuration.
    pub fn joint_transform(&self) -> SpatialTransform {
        match self {
            JointKind::Fixed => SpatialTransform::IDENTITY,
            JointKind::OneDof(joint) => match joint.kind {
                OneDofKind::Revolute => SpatialTransform::new(
                    DMat3::from_axis_angle(joint.axis, joint.q),
                    DVec3::ZERO,
                ),
                OneDofKind::Prismatic => {
                    SpatialTransform::new(DMat3::IDENTITY, joint.axis * joint.q)
                }
            },
            JointKind::SixDof(joint) => joint.pose.to_spatial(),
            JointKind::Coupled(joint) => {
                let r1 = DMat3::from_axis_angle(joint.first_axis, joint.q);
                SpatialTransform::new(r1 * joint.second_stage_rotation(), r1 * joint.offset)
            }
        }
    }

    /// Same placement as [`JointKind::joint_transform`], as a pose.
    pub fn joint_pose(&self) -> Pose {
        match self {
            JointKind::Fixed => Pose::IDENTITY,
            JointKind::OneDof(joint) => match joint.kind {
                OneDofKind::Revolute => {
                    Pose::from_orientation(DQuat::from_axis_angle(joint.axis, joint.q))
                }
                OneDofKind::Prismatic => Pose::from_position(joint.axis * joint.q),
            },
            JointKind::SixDof(joint) => joint.pose,
            JointKind::Coupled(joint) => {
                let r1 = DQuat::from_axis_angle(joint.first_axis, joint.q);
                let r2 = DQuat::from_axis_angle(joint.second_axis, joint.derived_angle());
                Pose::new(r1 * joint.offset, r1 * r2)
            }
        }
    }

    pub fn motion_subspace(&self) -> MotionSubspace {
        match self {
            JointKind::Fixed => MotionSubspace::EMPTY,
            JointKind::OneDof(joint) => MotionSubspace::single(joint.subspace_column()),
            JointKind::SixDof(_) => MotionSubspace::identity(),
            JointKind::Coupled(joint) => MotionSubspace::single(joint.subspace_column()),
        }
    }

    /// Velocity-product acceleration `dS/dt * qd` of the joint.
    pub fn bias_acceleration(&self) -> SpatialVec {
        match self {
            JointKind::Coupled(joint) => joint.bias_acceleration(),
            _ => SpatialVec::ZERO,
        }
    }

    pub fn velocity_into(&self, out: &mut [f64]) {
        match self {
            JointKind::Fixed => {}
            JointKind::OneDof(joint) => out[0] = joint.qd,
            JointKind::Coupled(joint) => out[0] = joint.qd,
            JointKind::SixDof(joint) => out[..6].copy_from_slice(&joint.twist.to_array()),
        }
    }

    pub fn set_velocity_from(&mut self, values: &[f64]) {
        match self {
            JointKind::Fixed => {}
            JointKind::OneDof(joint) => joint.qd = values[0],
            JointKind::Coupled(joint) => joint.qd = values[0],
            JointKind::SixDof(joint) => joint.twist = SpatialVec::from_slice(values),
        }
    }

    pub fn acceleration_into(&self, out: &mut [f64]) {
        match self {
            JointKind::Fixed => {}
            JointKind::OneDof(joint) => out[0] = joint.qdd,
            JointKind::Coupled(joint) => out[0] = joint.qdd,
            JointKind::SixDof(joint) => out[..6].copy_from_slice(&joint.acceleration.to_array()),
        }
    }

    pub fn set_acceleration_from(&mut self, values: &[f64]) {
        match self {
            JointKind::Fixed => {}
            JointKind::OneDof(joint) => joint.qdd = values[0],
            JointKind::Coupled(joint) => joint.qdd = values[0],
            JointKind::SixDof(joint) => joint.acceleration = SpatialVec::from_slice(values),
        }
    }

    /// Generalized effort fed to forward dynamics: saturated actuator effort minus damping.
    pub fn effective_effort_into(&self, out: &mut [f64]) {
        match self {
            JointKind::Fixed => {}
            JointKind::OneDof(joint) => {
                out[0] = joint.actuation.effective_effort(joint.tau, joint.qd)
            }
            JointKind::Coupled(joint) => {
                out[0] = joint.actuation.effective_effort(joint.tau, joint.qd)
            }
            JointKind::SixDof(joint) => out[..6].copy_from_slice(&joint.wrench.to_array()),
        }
    }

    pub fn delta_velocity(&self) -> Option<&dyn HasDeltaVelocity> {
        match self {
            JointKind::Fixed => None,
            JointKind::OneDof(joint) => Some(joint),
            JointKind::SixDof(joint) => Some(joint),
            JointKind::Coupled(joint) => Some(joint),
        }
    }

    pub fn delta_velocity_mut(&mut self) -> Option<&mut dyn HasDeltaVelocity> {
        match self {
            JointKind::Fixed => None,
            JointKind::OneDof(joint) => Some(joint),
            JointKind::SixDof(joint) => Some(joint),
            JointKind::Coupled(joint) => Some(joint),
        }
    }

    /// Scalar coordinate subject to position and velocity limits, if any.
    pub fn limited_coordinate(&self) -> Option<LimitedCoordinate> {
        let (q, qd, actuation) = match self {
            JointKind::OneDof(joint) => (joint.q, joint.qd, &joint.actuation),
            JointKind::Coupled(joint) => (joint.q, joint.qd, &joint.actuation),
            _ => return None,
        };
        if actuation.position_limits.is_none() && actuation.velocity_limit.is_none() {
            return None;
        }
        Some(LimitedCoordinate {
            q,
            qd,
            position_limits: actuation.position_limits,
            velocity_limit: actuation.velocity_limit,
        })
    }

    pub fn zero_motion(&mut self) {
        match self {
            JointKind::Fixed => {}
            JointKind::OneDof(joint) => {
                joint.qd = 0.0;
                joint.qdd = 0.0;
            }
            JointKind::Coupled(joint) => {
                joint.qd = 0.0;
                joint.qdd = 0.0;
            }
            JointKind::SixDof(joint) => {
                joint.twist = SpatialVec::ZERO;
                joint.acceleration = SpatialVec::ZERO;
            }
        }
    }
}

/// Snapshot of a limited scalar coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitedCoordinate {
    pub q: f64,
    pub qd: f64,
    pub position_limits: Option<JointLimits>,
    pub velocity_limit: Option<f64>,
}

/// A joint connecting a predecessor body to a successor body.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub predecessor: usize,
    pub successor: usize,
    /// Joint frame in the predecessor body frame.
    pub frame_in_parent: Pose,
    pub kind: JointKind,
    /// Ignored joints keep their configuration and receive no dynamics.
    pub ignored: bool,
    /// Offset of this joint's DoFs in the robot's generalized velocity vector.
    pub velocity_offset: usize,
}

impl Joint {
    /// DoFs that participate in dynamics.
    pub fn active_dofs(&self) -> usize {
        if self.ignored {
            0
        } else {
            self.kind.dofs()
        }
    }

    pub fn motion_subspace(&self) -> MotionSubspace {
        if self.ignored {
            MotionSubspace::EMPTY
        } else {
            self.kind.motion_subspace()
        }
    }

    /// Placement of the successor body frame in the predecessor body frame.
    pub fn successor_in_predecessor(&self) -> SpatialTransform {
        self.frame_in_parent
            .to_spatial()
            .then(&self.kind.joint_transform())
    }

    /// Successor velocity relative to the predecessor, in the successor frame.
    pub fn relative_twist(&self) -> SpatialVec {
        if self.ignored {
            return SpatialVec::ZERO;
        }
        let mut qd = [0.0; 6];
        self.kind.velocity_into(&mut qd);
        self.kind.motion_subspace().apply(&qd)
    }

    /// Successor pose relative to the predecessor body frame.
    pub fn successor_pose(&self) -> Pose {
        self.frame_in_parent.combine(&self.kind.joint_pose())
    }
}
