use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// A 6D spatial vector combining angular and linear components.
/// In motion space, angular is velocity and linear is translation.
/// In force space, angular is torque and linear is force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialVec {
    pub ang: DVec3,
    pub lin: DVec3,
}

impl SpatialVec {
    pub const ZERO: Self = Self {
        ang: DVec3::ZERO,
        lin: DVec3::ZERO,
    };

    pub fn new(ang: DVec3, lin: DVec3) -> Self {
        Self { ang, lin }
    }

    /// Unit vector along one of the six spatial axes (angular x,y,z then linear x,y,z).
    pub fn unit(axis: usize) -> Self {
        let mut out = Self::ZERO;
        match axis {
            0..=2 => out.ang[axis] = 1.0,
            _ => out.lin[axis - 3] = 1.0,
        }
        out
    }

    pub fn dot(&self, other: &SpatialVec) -> f64 {
        self.ang.dot(other.ang) + self.lin.dot(other.lin)
    }

    /// Spatial motion cross product: v1 x_m v2
    pub fn cross_motion(&self, other: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(other.ang),
            lin: self.ang.cross(other.lin) + self.lin.cross(other.ang),
        }
    }

    /// Spatial force cross product: v x_f f
    pub fn cross_force(&self, other: &SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.ang.cross(other.ang) + self.lin.cross(other.lin),
            lin: self.ang.cross(other.lin),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.ang.is_finite() && self.lin.is_finite()
    }

    pub fn to_array(&self) -> [f64; 6] {
        [
            self.ang.x, self.ang.y, self.ang.z, self.lin.x, self.lin.y, self.lin.z,
        ]
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            ang: DVec3::new(values[0], values[1], values[2]),
            lin: DVec3::new(values[3], values[4], values[5]),
        }
    }
}

impl std::ops::Add for SpatialVec {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            ang: self.ang + other.ang,
            lin: self.lin + other.lin,
        }
    }
}

impl std::ops::AddAssign for SpatialVec {
    fn add_assign(&mut self, other: Self) {
        self.ang += other.ang;
        self.lin += other.lin;
    }
}

impl std::ops::Sub for SpatialVec {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            ang: self.ang - other.ang,
            lin: self.lin - other.lin,
        }
    }
}

impl std::ops::Neg for SpatialVec {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            ang: -self.ang,
            lin: -self.lin,
        }
    }
}

impl std::ops::Mul<f64> for SpatialVec {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            ang: self.ang * rhs,
            lin: self.lin * rhs,
        }
    }
}

/// A 6x6 spatial matrix represented as 4 3x3 blocks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialMat {
    pub m00: DMat3,
    pub m01: DMat3,
    pub m10: DMat3,
    pub m11: DMat3,
}

impl Default for SpatialMat {
    fn default() -> Self {
        Self::ZERO
    }
}

impl SpatialMat {
    pub const ZERO: Self = Self {
        m00: DMat3::ZERO,
        m01: DMat3::ZERO,
        m10: DMat3::ZERO,
        m11: DMat3::ZERO,
    };

    pub fn new(m00: DMat3, m01: DMat3, m10: DMat3, m11: DMat3) -> Self {
        Self { m00, m01, m10, m11 }
    }

    pub fn mul_vec(&self, v: SpatialVec) -> SpatialVec {
        SpatialVec {
            ang: self.m00 * v.ang + self.m01 * v.lin,
            lin: self.m10 * v.ang + self.m11 * v.lin,
        }
    }

    pub fn mul_mat(&self, other: &SpatialMat) -> SpatialMat {
        SpatialMat {
            m00: self.m00 * other.m00 + self.m01 * other.m10,
            m01: self.m00 * other.m01 + self.m01 * other.m11,
            m10: self.m10 * other.m00 + self.m11 * other.m10,
            m11: self.m10 * other.m01 + self.m11 * other.m11,
        }
    }

    pub fn transpose(&self) -> SpatialMat {
        SpatialMat {
            m00: self.m00.transpose(),
            m01: self.m10.transpose(),
            m10: self.m01.transpose(),
            m11: self.m11.transpose(),
        }
    }

    /// Computes the outer product (a * b.T) as a 6x6 matrix.
    pub fn outer_product(a: SpatialVec, b: SpatialVec) -> Self {
        Self {
            m00: outer_vec3(a.ang, b.ang),
            m01: outer_vec3(a.ang, b.lin),
            m10: outer_vec3(a.lin, b.ang),
            m11: outer_vec3(a.lin, b.lin),
        }
    }
}

fn outer_vec3(a: DVec3, b: DVec3) -> DMat3 {
    DMat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Skew-symmetric matrix such that `skew(a) * b == a.cross(b)`.
pub fn skew(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

impl std::ops::Add for SpatialMat {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            m00: self.m00 + other.m00,
            m01: self.m01 + other.m01,
            m10: self.m10 + other.m10,
            m11: self.m11 + other.m11,
        }
    }
}

impl std::ops::Sub for SpatialMat {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            m00: self.m00 - other.m00,
            m01: self.m01 - other.m01,
            m10: self.m10 - other.m10,
            m11: self.m11 - other.m11,
        }
    }
}

impl std::ops::Mul<f64> for SpatialMat {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self {
            m00: self.m00 * rhs,
            m01: self.m01 * rhs,
            m10: self.m10 * rhs,
            m11: self.m11 * rhs,
        }
    }
}

/// Placement of a child frame in its parent frame.
///
/// `rotation` maps child coordinates into the parent, `translation` is the
/// child origin expressed in the parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialTransform {
    pub rotation: DMat3,
    pub translation: DVec3,
}

impl Default for SpatialTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SpatialTransform {
    pub const IDENTITY: Self = Self {
        rotation: DMat3::IDENTITY,
        translation: DVec3::ZERO,
    };

    pub fn new(rotation: DMat3, translation: DVec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn from_rotation_translation(rotation: DQuat, translation: DVec3) -> Self {
        Self::new(DMat3::from_quat(rotation), translation)
    }

    /// Placement of `child` (given in this transform's child frame) in this transform's parent.
    pub fn then(&self, child: &SpatialTransform) -> SpatialTransform {
        SpatialTransform {
            rotation: self.rotation * child.rotation,
            translation: self.translation + self.rotation * child.translation,
        }
    }

    /// Re-expresses a parent-frame motion vector in the child frame.
    pub fn motion_to_child(&self, v: SpatialVec) -> SpatialVec {
        let rt = self.rotation.transpose();
        SpatialVec {
            ang: rt * v.ang,
            lin: rt * (v.lin - self.translation.cross(v.ang)),
        }
    }

    /// Re-expresses a child-frame motion vector in the parent frame.
    pub fn motion_to_parent(&self, v: SpatialVec) -> SpatialVec {
        let ang = self.rotation * v.ang;
        SpatialVec {
            ang,
            lin: self.rotation * v.lin + self.translation.cross(ang),
        }
    }

    /// Re-expresses a child-frame force vector in the parent frame.
    pub fn force_to_parent(&self, f: SpatialVec) -> SpatialVec {
        let lin = self.rotation * f.lin;
        SpatialVec {
            ang: self.rotation * f.ang + self.translation.cross(lin),
            lin,
        }
    }

    /// Re-expresses a parent-frame force vector in the child frame.
    pub fn force_to_child(&self, f: SpatialVec) -> SpatialVec {
        let rt = self.rotation.transpose();
        SpatialVec {
            ang: rt * (f.ang - self.translation.cross(f.lin)),
            lin: rt * f.lin,
        }
    }

    /// 6x6 motion transform from the parent frame to the child frame.
    pub fn motion_matrix(&self) -> SpatialMat {
        let rt = self.rotation.transpose();
        SpatialMat {
            m00: rt,
            m01: DMat3::ZERO,
            m10: -(rt * skew(self.translation)),
            m11: rt,
        }
    }

    /// Moves a child-frame spatial inertia into the parent frame: X^T I X.
    pub fn inertia_to_parent(&self, inertia: &SpatialMat) -> SpatialMat {
        let x = self.motion_matrix();
        x.transpose().mul_mat(&inertia.mul_mat(&x))
    }
}

/// A spatial inertia tensor representing mass, center of mass, and rotational inertia.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialInertia {
    pub mass: f64,
    pub com: DVec3,
    /// Rotational inertia at COM.
    pub inertia: DMat3,
}

impl SpatialInertia {
    pub fn new(mass: f64, com: DVec3, inertia: DMat3) -> Self {
        Self { mass, com, inertia }
    }

    /// Converts this spatial inertia to its 6x6 matrix representation about the frame origin.
    pub fn to_mat(&self) -> SpatialMat {
        let m = self.mass;
        let c_skew = skew(self.com);
        let mc_skew = c_skew * m;

        // I_origin = I_com - m * c_skew * c_skew
        let i_origin = self.inertia - c_skew * c_skew * m;

        SpatialMat {
            m00: i_origin,
            m01: mc_skew,
            m10: mc_skew.transpose(),
            m11: DMat3::IDENTITY * m,
        }
    }

    /// Multiplies spatial inertia by spatial motion to get spatial force: f = I * v
    pub fn mul_motion(&self, v: SpatialVec) -> SpatialVec {
        self.to_mat().mul_vec(v)
    }
}
