use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::utils::spatial::SpatialTransform;

/// Position and orientation of a frame relative to another frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: DVec3,
    pub orientation: DQuat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: DVec3::ZERO,
        orientation: DQuat::IDENTITY,
    };

    pub fn new(position: DVec3, orientation: DQuat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_position(position: DVec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn from_orientation(orientation: DQuat) -> Self {
        Self {
            orientation,
            ..Self::IDENTITY
        }
    }

    /// Applies another pose on top of this one, returning the composition.
    pub fn combine(&self, other: &Pose) -> Pose {
        Pose {
            position: self.position + self.orientation * other.position,
            orientation: (self.orientation * other.orientation).normalize(),
        }
    }

    pub fn inverse(&self) -> Pose {
        let inv = self.orientation.conjugate();
        Pose {
            position: -(inv * self.position),
            orientation: inv,
        }
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.position + self.orientation * point
    }

    pub fn transform_vector(&self, vector: DVec3) -> DVec3 {
        self.orientation * vector
    }

    pub fn inverse_transform_point(&self, point: DVec3) -> DVec3 {
        self.orientation.conjugate() * (point - self.position)
    }

    pub fn inverse_transform_vector(&self, vector: DVec3) -> DVec3 {
        self.orientation.conjugate() * vector
    }

    pub fn rotation_matrix(&self) -> DMat3 {
        DMat3::from_quat(self.orientation)
    }

    pub fn to_spatial(&self) -> SpatialTransform {
        SpatialTransform::from_rotation_translation(self.orientation, self.position)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}

/// Mass, center of mass, and rotational inertia about the center of mass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub center_of_mass: DVec3,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            center_of_mass: DVec3::ZERO,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    pub fn new(mass: f64, center_of_mass: DVec3, inertia: DMat3) -> Self {
        Self {
            mass,
            center_of_mass,
            inertia,
        }
    }

    /// Massless placeholder used for the fixed root body.
    pub fn massless() -> Self {
        Self {
            mass: 0.0,
            center_of_mass: DVec3::ZERO,
            inertia: DMat3::ZERO,
        }
    }

    pub fn solid_box(mass: f64, half_extents: DVec3) -> Self {
        let size = half_extents * 2.0;
        let k = mass / 12.0;
        Self::new(
            mass,
            DVec3::ZERO,
            DMat3::from_diagonal(DVec3::new(
                k * (size.y * size.y + size.z * size.z),
                k * (size.x * size.x + size.z * size.z),
                k * (size.x * size.x + size.y * size.y),
            )),
        )
    }

    pub fn solid_sphere(mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self::new(mass, DVec3::ZERO, DMat3::from_diagonal(DVec3::splat(i)))
    }

    /// Solid cylinder with its axis along local Y.
    pub fn solid_cylinder(mass: f64, radius: f64, height: f64) -> Self {
        let axial = 0.5 * mass * radius * radius;
        let lateral = mass * (3.0 * radius * radius + height * height) / 12.0;
        Self::new(
            mass,
            DVec3::ZERO,
            DMat3::from_diagonal(DVec3::new(lateral, axial, lateral)),
        )
    }

    /// Thin rod of the given length along local X, centered at `center_of_mass`.
    pub fn slender_rod(mass: f64, length: f64, center_of_mass: DVec3) -> Self {
        let i = mass * length * length / 12.0;
        Self::new(
            mass,
            center_of_mass,
            DMat3::from_diagonal(DVec3::new(i * 1e-3, i, i)),
        )
    }

    pub fn with_center_of_mass(mut self, center_of_mass: DVec3) -> Self {
        self.center_of_mass = center_of_mass;
        self
    }

    /// True when the inertia tensor is symmetric and positive definite.
    pub fn has_positive_definite_inertia(&self) -> bool {
        let m = self.inertia;
        if !m.is_finite() {
            return false;
        }
        let asym = (m - m.transpose()).to_cols_array();
        let scale = m.to_cols_array().iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if asym.iter().any(|v| v.abs() > 1e-9 * scale.max(1.0)) {
            return false;
        }
        // Sylvester's criterion on the leading principal minors.
        let a = m.x_axis.x;
        let minor2 = m.x_axis.x * m.y_axis.y - m.y_axis.x * m.x_axis.y;
        a > 0.0 && minor2 > 0.0 && m.determinant() > 0.0
    }
}
