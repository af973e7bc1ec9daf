use glam::DQuat;

use crate::core::{
    joint::{JointKind, SixDofJoint},
    robot::Robot,
    types::Pose,
};

/// Semi-implicit Euler over joint coordinates.
///
/// Velocities are advanced first, including the impulse deltas, and the new
/// velocities then move the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Integrator;

impl Integrator {
    pub fn new() -> Self {
        Self
    }

    /// Advances every simulated joint by `dt`, clears the delta channels and
    /// refreshes forward kinematics.
    pub fn integrate(&self, robot: &mut Robot, dt: f64) {
        for joint in robot.joints.iter_mut().filter(|j| j.active_dofs() > 0) {
            match &mut joint.kind {
                JointKind::Fixed => {}
                JointKind::OneDof(j) => {
                    j.qd += dt * j.qdd + j.delta_qd;
                    j.q += dt * j.qd;
                }
                JointKind::Coupled(j) => {
                    j.qd += dt * j.qdd + j.delta_qd;
                    j.q += dt * j.qd;
                }
                JointKind::SixDof(j) => Self::integrate_floating(j, dt),
            }
        }
        robot.reset_delta_velocities();
        robot.update_kinematics();
    }

    /// Body-frame twist update, then exponential-map orientation update.
    ///
    /// The spatial acceleration is converted to the classical acceleration of
    /// the body origin before integrating, and the new linear velocity is
    /// re-expressed in the rotated body frame.
    fn integrate_floating(joint: &mut SixDofJoint, dt: f64) {
        let omega = joint.twist.ang + joint.acceleration.ang * dt + joint.delta_twist.ang;
        let classical = joint.acceleration.lin + joint.twist.ang.cross(joint.twist.lin);
        let velocity = joint.twist.lin + classical * dt + joint.delta_twist.lin;

        let rotation = joint.pose.orientation;
        let step = DQuat::from_scaled_axis(omega * dt);
        let position = joint.pose.position + rotation * velocity * dt;

        joint.pose = Pose::new(position, (rotation * step).normalize());
        joint.twist.ang = omega;
        joint.twist.lin = step.inverse() * velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        definition::{
            JointDefinition, JointKindDefinition, JointStateDefinition, OneDofJointDefinition,
            RigidBodyDefinition, RobotDefinition,
        },
        types::MassProperties,
    };
    use crate::utils::spatial::SpatialVec;
    use approx::assert_relative_eq;
    use glam::DVec3;

    fn floating(pose: Pose, twist: SpatialVec) -> Robot {
        let mut def = RobotDefinition::floating_body(
            "body",
            MassProperties::solid_box(1.0, DVec3::splat(0.2)),
            None,
            pose,
        );
        def.joints[0].initial_state = Some(JointStateDefinition::SixDof { pose, twist });
        Robot::from_definition(&def, 0).unwrap()
    }

    #[test]
    fn scalar_joint_uses_new_velocity_for_position() {
        let mut def = RobotDefinition::new("slider");
        def.add_body(RigidBodyDefinition::new("cart", MassProperties::solid_sphere(1.0, 0.1)))
            .add_joint(
                JointDefinition::new(
                    "rail",
                    "root",
                    "cart",
                    JointKindDefinition::Prismatic(OneDofJointDefinition::new(DVec3::X)),
                )
                .with_initial_state(JointStateDefinition::OneDof {
                    q: 1.0,
                    qd: 2.0,
                    tau: 0.0,
                }),
            );
        let mut robot = Robot::from_definition(&def, 0).unwrap();
        robot.set_generalized_acceleration(&[10.0]);
        robot.add_delta_velocities(&[-0.5]);
        Integrator::new().integrate(&mut robot, 0.1);

        let joint = robot.one_dof_joint("rail").unwrap();
        assert_relative_eq!(joint.qd, 2.5, epsilon = 1e-12);
        assert_relative_eq!(joint.q, 1.25, epsilon = 1e-12);
        assert_eq!(joint.delta_qd, 0.0);
        assert!(robot.bodies[1].pose.position.abs_diff_eq(DVec3::new(1.25, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn spinning_body_keeps_its_world_velocity() {
        // Pure spin about the body z axis while translating along world x.
        let omega = DVec3::new(0.0, 0.0, 3.0);
        let mut robot = floating(Pose::IDENTITY, SpatialVec::new(omega, DVec3::X));
        // Classical acceleration is zero: the spatial one carries -ω×v.
        robot.set_generalized_acceleration(
            &SpatialVec::new(DVec3::ZERO, -omega.cross(DVec3::X)).to_array(),
        );
        let dt = 1e-2;
        Integrator::new().integrate(&mut robot, dt);

        let body = &robot.bodies[1];
        assert!(body.pose.position.abs_diff_eq(DVec3::new(dt, 0.0, 0.0), 1e-12));
        let world_velocity = body.pose.transform_vector(body.twist.lin);
        assert!(world_velocity.abs_diff_eq(DVec3::X, 1e-12));
        let (axis, angle) = body.pose.orientation.to_axis_angle();
        assert!(axis.abs_diff_eq(DVec3::Z, 1e-9));
        assert_relative_eq!(angle, 3.0 * dt, epsilon = 1e-12);
    }

    #[test]
    fn free_fall_matches_semi_implicit_euler() {
        let start = Pose::new(DVec3::new(0.0, 0.0, 5.0), DQuat::from_rotation_y(0.7));
        let mut robot = floating(start, SpatialVec::ZERO);
        let g = DVec3::new(0.0, 0.0, -9.81);
        let dt = 1e-3;
        let mut expected_v = 0.0;
        let mut expected_z = 5.0;
        for _ in 0..100 {
            let body_g = robot.bodies[1].pose.inverse_transform_vector(g);
            robot.set_generalized_acceleration(&SpatialVec::new(DVec3::ZERO, body_g).to_array());
            Integrator::new().integrate(&mut robot, dt);
            expected_v += g.z * dt;
            expected_z += expected_v * dt;
        }
        let joint = robot.six_dof_joint("body_floating").unwrap();
        assert_relative_eq!(joint.pose.position.z, expected_z, epsilon = 1e-12);
    }
}
