use super::solver::{ImpulseUpdate, RobotBlock};
use crate::{config::ConstraintParameters, core::robot::Robot};

/// Unilateral constraint `sign * qd[dof] >= target` on one coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
struct LimitConstraint {
    dof: usize,
    sign: f64,
    target: f64,
    /// Diagonal entry of `M⁻¹` for `dof`.
    inverse_inertia: f64,
    impulse: f64,
}

/// Position and velocity limits of one robot that are active this tick.
#[derive(Debug, Clone)]
pub struct JointLimitCalculator {
    block: usize,
    constraints: Vec<LimitConstraint>,
}

impl JointLimitCalculator {
    /// Collects the limits that the predicted free motion would violate.
    ///
    /// Returns `None` when none are active, so the robot needs no limit pass.
    pub fn new(
        robot: &Robot,
        block_index: usize,
        block: &RobotBlock,
        params: &ConstraintParameters,
        dt: f64,
    ) -> Option<Self> {
        let mut constraints = Vec::new();
        for joint in robot.joints_to_consider() {
            let Some(limited) = joint.kind.limited_coordinate() else {
                continue;
            };
            let dof = joint.velocity_offset;
            let qd_free = block.free_velocity[dof];
            let inverse_inertia = block.inverse_mass[(dof, dof)];
            if !(inverse_inertia > 0.0 && inverse_inertia.is_finite()) {
                continue;
            }
            let mut push = |sign: f64, target: f64| {
                constraints.push(LimitConstraint {
                    dof,
                    sign,
                    target,
                    inverse_inertia,
                    impulse: 0.0,
                });
            };

            if let Some(limits) = limited.position_limits {
                let predicted = limited.q + dt * qd_free;
                for (sign, bound) in [(1.0, limits.lower), (-1.0, limits.upper)] {
                    // Signed distance to the bound, positive inside the range.
                    let gap = sign * (limited.q - bound);
                    let approaching = sign * qd_free < 0.0;
                    let crosses = sign * (predicted - bound) < 0.0;
                    if !(crosses && (approaching || gap < 0.0)) {
                        continue;
                    }
                    // Inside the range the approach is halted; a violation is pushed back.
                    let stop = if gap >= 0.0 {
                        0.0
                    } else {
                        params.error_reduction * -gap / dt
                    };
                    let closing_speed = -sign * qd_free;
                    let bounce = if gap <= 0.0 && closing_speed > params.restitution_threshold {
                        params.coefficient_of_restitution * closing_speed
                    } else {
                        f64::NEG_INFINITY
                    };
                    push(sign, stop.max(bounce));
                }
            }

            if let Some(limit) = limited.velocity_limit {
                if qd_free.abs() > limit {
                    push(-qd_free.signum(), -limit);
                }
            }
        }

        if constraints.is_empty() {
            None
        } else {
            Some(Self {
                block: block_index,
                constraints,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// One relaxed projected Gauss-Seidel sweep over this robot's limits.
    pub fn solve(&mut self, blocks: &mut [RobotBlock], relaxation: f64) -> ImpulseUpdate {
        let block = &mut blocks[self.block];
        let mut update = ImpulseUpdate::default();
        for constraint in &mut self.constraints {
            let dof = constraint.dof;
            let velocity =
                constraint.sign * (block.free_velocity[dof] + block.delta[dof]);
            let without_own = velocity - constraint.inverse_inertia * constraint.impulse;
            let wanted = ((constraint.target - without_own) / constraint.inverse_inertia).max(0.0);
            let previous = constraint.impulse;
            constraint.impulse = previous + (wanted - previous) * relaxation;
            let change = constraint.impulse - previous;
            if change != 0.0 {
                block.delta += block.inverse_mass.column(dof) * (constraint.sign * change);
            }
            update.merge(ImpulseUpdate {
                impulse: change.abs(),
                velocity: (constraint.inverse_inertia * change).abs(),
            });
        }
        update
    }
}
