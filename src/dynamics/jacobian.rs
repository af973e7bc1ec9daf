use glam::DVec3;
use nalgebra::{Matrix3xX, Vector3};

use crate::core::robot::Robot;

/// Linear point Jacobian of a world point rigidly attached to `body`.
///
/// Maps the robot's generalized velocity to the world-frame velocity of the
/// point. Columns of joints that do not support `body` are zero.
pub fn point_jacobian(robot: &Robot, body: usize, point: DVec3) -> Matrix3xX<f64> {
    let mut jacobian = Matrix3xX::zeros(robot.dof_count());
    for joint in robot.support_joints(body) {
        let frame = &robot.bodies[joint.successor].pose;
        let lever = point - frame.position;
        for (k, column) in joint.motion_subspace().columns().iter().enumerate() {
            let angular = frame.transform_vector(column.ang);
            let linear = frame.transform_vector(column.lin) + angular.cross(lever);
            jacobian.set_column(
                joint.velocity_offset + k,
                &Vector3::new(linear.x, linear.y, linear.z),
            );
        }
    }
    jacobian
}

pub fn to_vector3(v: DVec3) -> Vector3<f64> {
    Vector3::new(v.x, v.y, v.z)
}

pub fn to_dvec3(v: &Vector3<f64>) -> DVec3 {
    DVec3::new(v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::definition::{
        JointDefinition, JointKindDefinition, OneDofJointDefinition, RigidBodyDefinition,
        RobotDefinition,
    };
    use crate::core::types::{MassProperties, Pose};
    use crate::utils::spatial::SpatialVec;
    use glam::DQuat;
    use nalgebra::DVector;

    #[test]
    fn jacobian_reproduces_point_velocity() {
        let mut def = RobotDefinition::new("arm");
        def.add_body(RigidBodyDefinition::new("slider", MassProperties::solid_sphere(1.0, 0.1)))
            .add_body(RigidBodyDefinition::new("link", MassProperties::solid_sphere(1.0, 0.1)))
            .add_joint(JointDefinition::new(
                "rail",
                "root",
                "slider",
                JointKindDefinition::Prismatic(OneDofJointDefinition::new(DVec3::X)),
            ))
            .add_joint(
                JointDefinition::new(
                    "pin",
                    "slider",
                    "link",
                    JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::new(
                        0.0, 1.0, 1.0,
                    ))),
                )
                .with_frame(Pose::new(DVec3::new(0.0, 0.2, 0.5), DQuat::from_rotation_z(0.3))),
            );
        let mut robot = Robot::from_definition(&def, 0).unwrap();
        robot.one_dof_joint_mut("rail").unwrap().q = 0.4;
        robot.one_dof_joint_mut("pin").unwrap().q = -0.9;
        robot.set_generalized_velocity(&[0.5, 2.0]);
        robot.update_kinematics();

        let link = robot.body_index("link").unwrap();
        let point = robot.bodies[link].pose.transform_point(DVec3::new(0.3, -0.1, 0.2));
        let jacobian = point_jacobian(&robot, link, point);
        let qd = DVector::from_vec(robot.generalized_velocity());
        let from_jacobian = to_dvec3(&(jacobian * qd));
        let expected = robot.bodies[link].point_velocity_world(point);
        assert!(from_jacobian.abs_diff_eq(expected, 1e-12));
    }

    #[test]
    fn floating_base_columns_are_body_frame_twist() {
        let def = RobotDefinition::floating_body(
            "box",
            MassProperties::solid_box(1.0, DVec3::splat(0.5)),
            None,
            Pose::new(DVec3::new(1.0, 2.0, 3.0), DQuat::from_rotation_y(0.8)),
        );
        let mut robot = Robot::from_definition(&def, 0).unwrap();
        let twist = SpatialVec::new(DVec3::new(0.1, -0.4, 0.9), DVec3::new(1.0, 0.0, -2.0));
        robot.set_generalized_velocity(&twist.to_array());
        robot.update_kinematics();

        let point = DVec3::new(1.5, 2.5, 2.5);
        let jacobian = point_jacobian(&robot, 1, point);
        assert_eq!(jacobian.ncols(), 6);
        let qd = DVector::from_vec(robot.generalized_velocity());
        let v = jacobian * qd;
        let expected = robot.bodies[1].point_velocity_world(point);
        assert!(DVec3::new(v[0], v[1], v[2]).abs_diff_eq(expected, 1e-12));
    }
}
