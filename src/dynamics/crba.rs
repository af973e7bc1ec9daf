//! Joint-space inertia and inverse dynamics.
//!
//! The composite-rigid-body algorithm builds the mass matrix `M(q)` used by
//! the impulse calculators; the recursive Newton-Euler pass gives the
//! efforts that produce a requested `qdd` and is mostly used to check the
//! articulated-body solver.

use glam::DVec3;
use nalgebra::DMatrix;

use crate::core::robot::Robot;
use crate::utils::spatial::{SpatialMat, SpatialTransform, SpatialVec};

/// Mass matrix and its inverse for one robot at the current configuration.
#[derive(Debug, Clone)]
pub struct JointSpaceInertia {
    pub mass_matrix: DMatrix<f64>,
    pub inverse: DMatrix<f64>,
    /// Set when `M` was not numerically positive definite and had to be regularized.
    pub regularized_pivot: Option<f64>,
}

impl JointSpaceInertia {
    pub fn compute(robot: &Robot, regularization: f64) -> Self {
        let mass_matrix = mass_matrix(robot);
        let n = mass_matrix.nrows();
        if let Some(cholesky) = mass_matrix.clone().cholesky() {
            let pivot = cholesky.l_dirty().diagonal().min();
            if n == 0 || pivot * pivot > regularization {
                return Self {
                    inverse: cholesky.inverse(),
                    mass_matrix,
                    regularized_pivot: None,
                };
            }
        }

        let pivot = mass_matrix.diagonal().min();
        let scale = mass_matrix.diagonal().max().max(1.0);
        let mut shift = regularization.max(f64::EPSILON) * scale;
        let mut inverse = None;
        // Grow the diagonal shift until the factorization succeeds.
        for _ in 0..8 {
            let shifted = &mass_matrix + DMatrix::identity(n, n) * shift;
            if let Some(cholesky) = shifted.cholesky() {
                inverse = Some(cholesky.inverse());
                break;
            }
            shift *= 100.0;
        }
        log::debug!(
            "robot '{}': mass matrix regularized (pivot {pivot:e}, shift {shift:e})",
            robot.name()
        );
        Self {
            inverse: inverse.unwrap_or_else(|| DMatrix::zeros(n, n)),
            mass_matrix,
            regularized_pivot: Some(pivot),
        }
    }
}

fn joint_transforms(robot: &Robot) -> Vec<SpatialTransform> {
    robot
        .joints
        .iter()
        .map(|j| j.successor_in_predecessor())
        .collect()
}

/// Composite-rigid-body mass matrix over the robot's active DoFs.
pub fn mass_matrix(robot: &Robot) -> DMatrix<f64> {
    let n = robot.dof_count();
    let transforms = joint_transforms(robot);
    let mut composite: Vec<SpatialMat> = robot
        .bodies
        .iter()
        .map(|b| *b.spatial_inertia())
        .collect();
    for (j, joint) in robot.joints.iter().enumerate().rev() {
        if joint.predecessor != 0 {
            let moved = transforms[j].inertia_to_parent(&composite[joint.successor]);
            composite[joint.predecessor] = composite[joint.predecessor] + moved;
        }
    }

    let mut m = DMatrix::zeros(n, n);
    for (j, joint) in robot.joints.iter().enumerate() {
        let subspace = joint.motion_subspace();
        for (k, column) in subspace.columns().iter().enumerate() {
            let col = joint.velocity_offset + k;
            let mut force = composite[joint.successor].mul_vec(*column);
            for (r, other) in subspace.columns().iter().enumerate() {
                m[(joint.velocity_offset + r, col)] = other.dot(&force);
            }

            let mut current = j;
            while let Some(parent_joint) = robot.bodies[robot.joints[current].predecessor].parent_joint {
                force = transforms[current].force_to_parent(force);
                let ancestor = &robot.joints[parent_joint];
                for (r, other) in ancestor.motion_subspace().columns().iter().enumerate() {
                    let row = ancestor.velocity_offset + r;
                    let value = other.dot(&force);
                    m[(row, col)] = value;
                    m[(col, row)] = value;
                }
                current = parent_joint;
            }
        }
    }
    m
}

/// Recursive Newton-Euler: efforts needed to realize `qdd` at the current
/// state under `gravity` and the bodies' external wrenches.
pub fn inverse_dynamics(robot: &Robot, qdd: &[f64], gravity: DVec3) -> Vec<f64> {
    let transforms = joint_transforms(robot);
    let bodies = robot.bodies.len();
    let mut v = vec![SpatialVec::ZERO; bodies];
    let mut a = vec![SpatialVec::ZERO; bodies];
    let mut f = vec![SpatialVec::ZERO; bodies];
    a[0] = SpatialVec::new(DVec3::ZERO, -gravity);

    for (j, joint) in robot.joints.iter().enumerate() {
        let (p, c) = (joint.predecessor, joint.successor);
        let joint_twist = joint.relative_twist();
        let subspace = joint.motion_subspace();
        let n = subspace.len();
        let joint_qdd = &qdd[joint.velocity_offset..joint.velocity_offset + n];
        let joint_bias = if joint.ignored {
            SpatialVec::ZERO
        } else {
            joint.kind.bias_acceleration()
        };

        v[c] = transforms[j].motion_to_child(v[p]) + joint_twist;
        a[c] = transforms[j].motion_to_child(a[p])
            + subspace.apply(joint_qdd)
            + joint_bias
            + v[c].cross_motion(&joint_twist);
        let body = &robot.bodies[c];
        let inertia = body.spatial_inertia();
        f[c] = inertia.mul_vec(a[c]) + v[c].cross_force(&inertia.mul_vec(v[c]))
            - body.external_wrench;
    }

    let mut tau = vec![0.0; robot.dof_count()];
    for (j, joint) in robot.joints.iter().enumerate().rev() {
        let c = joint.successor;
        for (k, column) in joint.motion_subspace().columns().iter().enumerate() {
            tau[joint.velocity_offset + k] = column.dot(&f[c]);
        }
        if joint.predecessor != 0 {
            let moved = transforms[j].force_to_parent(f[c]);
            f[joint.predecessor] += moved;
        }
    }
    tau
}
