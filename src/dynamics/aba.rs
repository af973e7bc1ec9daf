use glam::DVec3;
use nalgebra::DMatrix;

use crate::core::robot::Robot;
use crate::utils::spatial::{SpatialMat, SpatialTransform, SpatialVec};

/// Featherstone articulated-body forward dynamics over a [`Robot`] tree.
///
/// Everything is expressed in body coordinates. Gravity enters as a fictitious
/// upward acceleration of the fixed root, so `qdd` and body accelerations come
/// out with gravity already accounted for. Scratch buffers are reused across
/// ticks; call [`ForwardDynamicsCalculator::compute`] once per tick.
#[derive(Debug, Default, Clone)]
pub struct ForwardDynamicsCalculator {
    transforms: Vec<SpatialTransform>,
    velocities: Vec<SpatialVec>,
    bias_accelerations: Vec<SpatialVec>,
    articulated_inertias: Vec<SpatialMat>,
    articulated_biases: Vec<SpatialVec>,
    accelerations: Vec<SpatialVec>,
    u_columns: Vec<[SpatialVec; 6]>,
    d_inverses: Vec<DMatrix<f64>>,
    joint_forces: Vec<[f64; 6]>,
    efforts: Vec<f64>,
    qdd: Vec<f64>,
    smallest_pivot: Option<f64>,
}

/// Pivot below which a joint-space inertia block is treated as singular.
const SINGULAR_PIVOT: f64 = 1.0e-12;

impl ForwardDynamicsCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self, robot: &Robot) {
        let bodies = robot.bodies.len();
        let joints = robot.joints.len();
        self.transforms.clear();
        self.transforms.resize(joints, SpatialTransform::IDENTITY);
        self.velocities.clear();
        self.velocities.resize(bodies, SpatialVec::ZERO);
        self.bias_accelerations.clear();
        self.bias_accelerations.resize(bodies, SpatialVec::ZERO);
        self.articulated_inertias.clear();
        self.articulated_inertias.resize(bodies, SpatialMat::ZERO);
        self.articulated_biases.clear();
        self.articulated_biases.resize(bodies, SpatialVec::ZERO);
        self.accelerations.clear();
        self.accelerations.resize(bodies, SpatialVec::ZERO);
        self.u_columns.clear();
        self.u_columns.resize(joints, [SpatialVec::ZERO; 6]);
        self.d_inverses.clear();
        self.d_inverses.resize(joints, DMatrix::zeros(0, 0));
        self.joint_forces.clear();
        self.joint_forces.resize(joints, [0.0; 6]);
        self.qdd.clear();
        self.qdd.resize(robot.dof_count(), 0.0);
        self.smallest_pivot = None;
    }

    /// Computes joint accelerations for the robot's current state and effort,
    /// writes them into the joints, and stores body accelerations.
    ///
    /// Returns the smallest regularized pivot if a joint-space inertia block
    /// was singular, `None` otherwise.
    pub fn compute(&mut self, robot: &mut Robot, gravity: DVec3) -> Option<f64> {
        self.reset(robot);
        self.efforts = robot.generalized_effort();

        // --- Pass 1: Outward ---
        for (j, joint) in robot.joints.iter().enumerate() {
            let parent = joint.predecessor;
            let child = joint.successor;
            let x = joint.successor_in_predecessor();
            let joint_twist = joint.relative_twist();

            let v = x.motion_to_child(self.velocities[parent]) + joint_twist;
            let joint_bias = if joint.ignored {
                SpatialVec::ZERO
            } else {
                joint.kind.bias_acceleration()
            };
            self.transforms[j] = x;
            self.velocities[child] = v;
            self.bias_accelerations[child] = joint_bias + v.cross_motion(&joint_twist);

            let body = &robot.bodies[child];
            let inertia = *body.spatial_inertia();
            self.articulated_inertias[child] = inertia;
            self.articulated_biases[child] =
                v.cross_force(&inertia.mul_vec(v)) - body.external_wrench;
        }

        // --- Pass 2: Inward ---
        for (j, joint) in robot.joints.iter().enumerate().rev() {
            let child = joint.successor;
            let subspace = joint.motion_subspace();
            let columns = subspace.columns();
            let n = columns.len();
            let ia = self.articulated_inertias[child];
            let pa = self.articulated_biases[child];
            let c = self.bias_accelerations[child];

            let (reduced_inertia, reduced_bias) = if n == 0 {
                (ia, pa + ia.mul_vec(c))
            } else {
                let mut u = [SpatialVec::ZERO; 6];
                for (k, s) in columns.iter().enumerate() {
                    u[k] = ia.mul_vec(*s);
                }
                let d = DMatrix::from_fn(n, n, |r, k| columns[r].dot(&u[k]));
                let d_inv = self.invert_joint_inertia(d);

                let offset = joint.velocity_offset;
                let mut force = [0.0; 6];
                for (k, s) in columns.iter().enumerate() {
                    force[k] = self.efforts[offset + k] - s.dot(&pa);
                }

                // Ia = IA - U D⁻¹ Uᵀ must be complete before it carries the bias.
                let mut reduced_inertia = ia;
                let mut weighted_force = SpatialVec::ZERO;
                for r in 0..n {
                    let mut weighted = 0.0;
                    for k in 0..n {
                        let w = d_inv[(r, k)];
                        reduced_inertia = reduced_inertia - SpatialMat::outer_product(u[r], u[k]) * w;
                        weighted += w * force[k];
                    }
                    weighted_force += u[r] * weighted;
                }
                let reduced_bias = pa + reduced_inertia.mul_vec(c) + weighted_force;

                self.u_columns[j] = u;
                self.d_inverses[j] = d_inv;
                self.joint_forces[j] = force;
                (reduced_inertia, reduced_bias)
            };

            let parent = joint.predecessor;
            if parent != 0 {
                let x = self.transforms[j];
                self.articulated_inertias[parent] =
                    self.articulated_inertias[parent] + x.inertia_to_parent(&reduced_inertia);
                self.articulated_biases[parent] += x.force_to_parent(reduced_bias);
            }
        }

        // --- Pass 3: Outward ---
        self.accelerations[0] = SpatialVec::new(DVec3::ZERO, -gravity);
        for (j, joint) in robot.joints.iter().enumerate() {
            let child = joint.successor;
            let a_hat = self.transforms[j].motion_to_child(self.accelerations[joint.predecessor])
                + self.bias_accelerations[child];
            let subspace = joint.motion_subspace();
            let columns = subspace.columns();
            let n = columns.len();
            if n == 0 {
                self.accelerations[child] = a_hat;
                continue;
            }

            let u = &self.u_columns[j];
            let force = &self.joint_forces[j];
            let d_inv = &self.d_inverses[j];
            let mut qdd = [0.0; 6];
            for r in 0..n {
                qdd[r] = (0..n)
                    .map(|k| d_inv[(r, k)] * (force[k] - u[k].dot(&a_hat)))
                    .sum();
            }
            self.qdd[joint.velocity_offset..joint.velocity_offset + n].copy_from_slice(&qdd[..n]);
            self.accelerations[child] = a_hat + subspace.apply(&qdd[..n]);
        }

        robot.set_generalized_acceleration(&self.qdd);
        for (body, a) in robot.bodies.iter_mut().zip(&self.accelerations).skip(1) {
            // Remove the fictitious root acceleration to report the true one.
            let gravity_in_body = body.pose.inverse_transform_vector(gravity);
            body.acceleration = SpatialVec::new(a.ang, a.lin + gravity_in_body);
        }
        self.smallest_pivot
    }

    /// Joint accelerations of the last [`ForwardDynamicsCalculator::compute`] call.
    pub fn joint_accelerations(&self) -> &[f64] {
        &self.qdd
    }

    fn invert_joint_inertia(&mut self, d: DMatrix<f64>) -> DMatrix<f64> {
        let n = d.nrows();
        if let Some(cholesky) = d.clone().cholesky() {
            let smallest = cholesky.l_dirty().diagonal().min();
            if smallest * smallest > SINGULAR_PIVOT {
                return cholesky.inverse();
            }
        }
        let pivot = d.diagonal().min();
        self.smallest_pivot = Some(self.smallest_pivot.map_or(pivot, |p| p.min(pivot)));
        let regularized = d + DMatrix::identity(n, n) * SINGULAR_PIVOT.sqrt();
        regularized
            .try_inverse()
            .unwrap_or_else(|| DMatrix::zeros(n, n))
    }
}
