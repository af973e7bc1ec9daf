//! Impulse at a single contact point under a Coulomb friction cone.

use glam::DVec3;
use nalgebra::{DVector, Matrix3, Matrix3xX, MatrixXx3, Vector3};

use super::{
    jacobian::{point_jacobian, to_dvec3, to_vector3},
    solver::{ImpulseUpdate, RobotBlock},
};
use crate::{
    collision::contact::{Collision, ContactImpulse, ContactPoint},
    core::{collider::CollidableOwner, robot::Robot},
};

/// Eigenvalues of `W` below this share of the largest one are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// Largest eigenvalue of `W` under which a contact cannot move at all.
const IMMOBILE_THRESHOLD: f64 = 1e-14;

/// One robot's share of a contact: `v = J qd`, `Δqd = M⁻¹ Jᵀ λ`.
#[derive(Debug, Clone)]
struct ContactSide {
    block: usize,
    jacobian: Matrix3xX<f64>,
    response: MatrixXx3<f64>,
}

/// Local problem of one contact point, solved with the other constraints held fixed.
///
/// The impulse is a world-frame vector applied to side B; side A receives its
/// negative. With `n` pointing from A to B, `n · (v_B - v_A) >= 0` separates.
#[derive(Debug, Clone)]
pub struct ContactImpulseCalculator {
    collision: usize,
    point: usize,
    position: DVec3,
    normal: Vector3<f64>,
    sides: Vec<ContactSide>,
    inverse_inertia: Matrix3<f64>,
    pseudo_inverse: Matrix3<f64>,
    free_velocity: Vector3<f64>,
    target_normal_velocity: f64,
    friction: f64,
    impulse: Vector3<f64>,
    active: bool,
    instability: Option<f64>,
}

impl ContactImpulseCalculator {
    /// Builds the calculator from the bodies' current kinematics.
    ///
    /// `block_of` maps a robot index to its block in the group.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collision_index: usize,
        point_index: usize,
        collision: &Collision,
        point: &ContactPoint,
        robots: &[Robot],
        blocks: &[RobotBlock],
        block_of: impl Fn(usize) -> Option<usize>,
        dt: f64,
    ) -> Self {
        let params = &collision.parameters;
        let mut sides: Vec<ContactSide> = Vec::with_capacity(2);
        for (owner, sign) in [(collision.owner_a, -1.0), (collision.owner_b, 1.0)] {
            let CollidableOwner::Robot { robot, body } = owner else {
                continue;
            };
            let Some(block) = block_of(robot) else {
                continue;
            };
            let jacobian = point_jacobian(&robots[robot], body, point.position) * sign;
            // Self collisions share one robot: both sides fold into a single Jacobian.
            match sides.iter_mut().find(|s| s.block == block) {
                Some(side) => side.jacobian += jacobian,
                None => sides.push(ContactSide {
                    block,
                    jacobian,
                    response: MatrixXx3::zeros(0),
                }),
            }
        }

        let mut inverse_inertia = Matrix3::zeros();
        let mut free_velocity = Vector3::zeros();
        for side in &mut sides {
            let block = &blocks[side.block];
            side.response = &block.inverse_mass * side.jacobian.transpose();
            inverse_inertia += &side.jacobian * &side.response;
            free_velocity += &side.jacobian * &block.free_velocity;
        }

        let normal = to_vector3(point.normal);
        let closing_speed = -normal.dot(&free_velocity);
        let restitution = if closing_speed > params.restitution_threshold {
            params.coefficient_of_restitution * closing_speed
        } else {
            0.0
        };
        let excess = (point.depth - params.minimum_penetration).max(0.0);
        let error_reduction = params.error_reduction * excess / dt;

        let mut calculator = Self {
            collision: collision_index,
            point: point_index,
            position: point.position,
            normal,
            sides,
            inverse_inertia,
            pseudo_inverse: Matrix3::zeros(),
            free_velocity,
            target_normal_velocity: restitution.max(error_reduction),
            friction: params.coefficient_of_friction,
            impulse: Vector3::zeros(),
            active: true,
            instability: None,
        };
        calculator.update_inertia(params.regularization);
        calculator
    }

    /// Truncated-eigenvalue pseudo-inverse of `W = J M⁻¹ Jᵀ`.
    ///
    /// Rank-deficient `W` is expected (a single revolute joint can only move a
    /// point along one direction). Only a non-finite or indefinite `W` counts
    /// as numerical instability.
    fn update_inertia(&mut self, regularization: f64) {
        let w = self.inverse_inertia;
        if !w.iter().all(|v| v.is_finite()) {
            self.active = false;
            self.instability = Some(f64::NAN);
            return;
        }
        let symmetric = (w + w.transpose()) * 0.5;
        let eigen = symmetric.symmetric_eigen();
        let largest = eigen.eigenvalues.max();
        let smallest = eigen.eigenvalues.min();
        if largest < IMMOBILE_THRESHOLD {
            self.active = false;
            return;
        }
        if smallest < -RANK_TOLERANCE.max(regularization) * largest {
            self.instability = Some(smallest);
        }

        let cutoff = (RANK_TOLERANCE * largest).max(regularization);
        let mut pseudo_inverse = Matrix3::zeros();
        for (k, &value) in eigen.eigenvalues.iter().enumerate() {
            if value > cutoff {
                let v = eigen.eigenvectors.column(k);
                pseudo_inverse += v * v.transpose() / value;
            }
        }
        self.inverse_inertia = symmetric;
        self.pseudo_inverse = pseudo_inverse;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Smallest eigenvalue of an indefinite or non-finite `W`, if one was seen.
    pub fn instability(&self) -> Option<f64> {
        self.instability
    }

    fn current_velocity(&self, blocks: &[RobotBlock]) -> Vector3<f64> {
        self.sides
            .iter()
            .fold(self.free_velocity, |v, side| v + &side.jacobian * &blocks[side.block].delta)
    }

    /// Impulse that makes the contact velocity `c + W λ` admissible.
    fn local_impulse(&self, c: &Vector3<f64>) -> Vector3<f64> {
        let n = self.normal;
        let target = self.target_normal_velocity;
        let normal_velocity = n.dot(c);
        if normal_velocity >= target {
            return Vector3::zeros();
        }

        let sticking = self.pseudo_inverse * (n * target - c);
        let normal_impulse = sticking.dot(&n);
        let tangential = sticking - n * normal_impulse;
        if normal_impulse >= 0.0 && tangential.norm() <= self.friction * normal_impulse {
            return sticking;
        }

        // Sliding: friction on the cone boundary against the sticking direction.
        if let Some(slip) = tangential.try_normalize(1e-12) {
            let direction = n + slip * self.friction;
            let denominator = n.dot(&(self.inverse_inertia * direction));
            if denominator > IMMOBILE_THRESHOLD {
                let magnitude = (target - normal_velocity) / denominator;
                if magnitude >= 0.0 {
                    return direction * magnitude;
                }
            }
        }

        let denominator = n.dot(&(self.inverse_inertia * n));
        if denominator > IMMOBILE_THRESHOLD {
            n * ((target - normal_velocity) / denominator)
        } else {
            Vector3::zeros()
        }
    }

    /// One relaxed local solve; the change is pushed into the shared deltas.
    pub fn solve(&mut self, blocks: &mut [RobotBlock], relaxation: f64) -> ImpulseUpdate {
        if !self.active {
            return ImpulseUpdate::default();
        }
        let v = self.current_velocity(blocks);
        let c = v - self.inverse_inertia * self.impulse;
        let target = self.local_impulse(&c);
        let previous = self.impulse;
        self.impulse = previous + (target - previous) * relaxation;
        let change = self.impulse - previous;

        for side in &self.sides {
            let delta: DVector<f64> = &side.response * change;
            blocks[side.block].delta += delta;
        }
        ImpulseUpdate {
            impulse: change.amax(),
            velocity: (self.inverse_inertia * change).amax(),
        }
    }

    pub fn impulse(&self) -> DVec3 {
        to_dvec3(&self.impulse)
    }

    pub fn report(&self) -> ContactImpulse {
        ContactImpulse {
            collision: self.collision,
            point: self.point,
            position: self.position,
            normal: to_dvec3(&self.normal),
            impulse: self.impulse(),
        }
    }

    /// Contact velocity along the normal once all current deltas are applied.
    pub fn normal_velocity(&self, blocks: &[RobotBlock]) -> f64 {
        self.normal.dot(&self.current_velocity(blocks))
    }

    pub fn target_normal_velocity(&self) -> f64 {
        self.target_normal_velocity
    }

    #[cfg(test)]
    pub(crate) fn inverse_inertia(&self) -> &Matrix3<f64> {
        &self.inverse_inertia
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::contact::CollidableId;
    use crate::config::ContactParameters;
    use crate::core::{
        collider::Shape,
        definition::RobotDefinition,
        types::{MassProperties, Pose},
    };
    use crate::utils::spatial::SpatialVec;
    use approx::assert_relative_eq;

    fn falling_box(velocity: DVec3) -> Robot {
        let def = RobotDefinition::floating_body(
            "box",
            MassProperties::solid_box(2.0, DVec3::splat(0.5)),
            Some(Shape::cuboid(DVec3::splat(0.5))),
            Pose::from_position(DVec3::new(0.0, 0.0, 0.49)),
        );
        let mut robot = Robot::from_definition(&def, 0).unwrap();
        robot.set_generalized_velocity(&SpatialVec::new(DVec3::ZERO, velocity).to_array());
        robot.update_kinematics();
        robot
    }

    fn ground_collision(position: DVec3) -> Collision {
        Collision {
            id_a: CollidableId::Robot { robot: 0, slot: 0 },
            id_b: CollidableId::Terrain { slot: 0 },
            owner_a: CollidableOwner::Robot { robot: 0, body: 1 },
            owner_b: CollidableOwner::Terrain { object: 0 },
            points: vec![ContactPoint::new(position, -DVec3::Z, 0.01)],
            parameters: ContactParameters::default(),
        }
    }

    fn calculator(robot: &Robot, params: &ContactParameters, position: DVec3) -> (ContactImpulseCalculator, Vec<RobotBlock>) {
        let (block, _) = RobotBlock::new(robot, params.regularization, 1e-3);
        let blocks = vec![block];
        let collision = Collision {
            parameters: *params,
            ..ground_collision(position)
        };
        let calc = ContactImpulseCalculator::new(
            0,
            0,
            &collision,
            &collision.points[0],
            std::slice::from_ref(robot),
            &blocks,
            |r| (r == 0).then_some(0),
            1e-3,
        );
        (calc, blocks)
    }

    #[test]
    fn centered_contact_stops_the_fall() {
        let robot = falling_box(DVec3::new(0.0, 0.0, -1.0));
        let params = ContactParameters::default().with_error_reduction(0.0);
        let (mut calc, mut blocks) = calculator(&robot, &params, DVec3::new(0.0, 0.0, -0.005));
        assert!(calc.is_active());
        calc.solve(&mut blocks, 1.0);
        assert_relative_eq!(calc.normal_velocity(&blocks), 0.0, epsilon = 1e-9);
        // Side A is the box: the ground pushes it up, so B receives a downward impulse.
        assert!(calc.impulse().z < 0.0);
        assert!(calc.report().normal_component() > 0.0);
    }

    #[test]
    fn separating_contact_applies_nothing() {
        let robot = falling_box(DVec3::new(0.0, 0.0, 2.0));
        let (mut calc, mut blocks) = calculator(&robot, &ContactParameters::default(), DVec3::ZERO);
        let update = calc.solve(&mut blocks, 1.0);
        assert_eq!(update.impulse, 0.0);
        assert_eq!(calc.impulse(), DVec3::ZERO);
    }

    #[test]
    fn impulse_stays_inside_the_friction_cone() {
        let robot = falling_box(DVec3::new(3.0, 0.0, -1.0));
        let params = ContactParameters::default().with_friction(0.2);
        let (mut calc, mut blocks) = calculator(&robot, &params, DVec3::new(0.3, 0.2, -0.005));
        calc.solve(&mut blocks, 1.0);
        let report = calc.report();
        assert!(report.normal_component() > 0.0);
        assert!(report.tangential_component().length() <= 0.2 * report.normal_component() + 1e-9);
    }

    #[test]
    fn restitution_reverses_closing_speed() {
        let robot = falling_box(DVec3::new(0.0, 0.0, -2.0));
        let params = ContactParameters {
            coefficient_of_restitution: 0.5,
            restitution_threshold: 0.1,
            error_reduction: 0.0,
            ..ContactParameters::default()
        };
        let (mut calc, mut blocks) = calculator(&robot, &params, DVec3::ZERO);
        calc.solve(&mut blocks, 1.0);
        // No forward dynamics ran, so the predicted velocity is the current one.
        assert_relative_eq!(calc.target_normal_velocity(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(calc.normal_velocity(&blocks), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn effective_inverse_inertia_of_a_point_mass_is_isotropic() {
        let robot = falling_box(DVec3::ZERO);
        let params = ContactParameters::default();
        let (calc, _) = calculator(&robot, &params, robot.bodies[1].pose.position);
        assert!((calc.inverse_inertia() - Matrix3::identity() * 0.5).amax() < 1e-12);
    }
}
