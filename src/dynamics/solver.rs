//! Multi-contact impulse calculation for one collision group.
//!
//! Every contact point and every robot's active joint limits become a local
//! calculator. Calculators are swept in a fixed order with successive
//! over-relaxation; each one pushes its velocity change straight into the
//! shared per-robot delta so the next calculator sees it. Robots are only
//! read while solving, so disjoint groups can be solved in parallel and the
//! resulting deltas written back afterwards.

use nalgebra::{DMatrix, DVector};

use super::{
    contact_impulse::ContactImpulseCalculator, crba::JointSpaceInertia, island::CollisionGroup,
    joint_limit::JointLimitCalculator,
};
use crate::{
    collision::contact::{Collision, ContactImpulse},
    config::{ConstraintParameters, ContactParameters, SolverParameters},
    core::robot::Robot,
    error::Degradation,
};

/// Iteration multiplier of the strict second pass.
const STRICT_BUDGET_FACTOR: usize = 10;

/// Joint-space view of one robot during the impulse stage.
#[derive(Debug, Clone)]
pub struct RobotBlock {
    pub robot: usize,
    pub inverse_mass: DMatrix<f64>,
    /// Predicted velocity without constraints: `qd + dt * qdd`.
    pub free_velocity: DVector<f64>,
    /// Accumulated constraint velocity change.
    pub delta: DVector<f64>,
}

impl RobotBlock {
    /// Returns the block and the pivot of the mass matrix if it had to be regularized.
    pub fn new(robot: &Robot, regularization: f64, dt: f64) -> (Self, Option<f64>) {
        let inertia = JointSpaceInertia::compute(robot, regularization);
        let qd = DVector::from_vec(robot.generalized_velocity());
        let qdd = DVector::from_vec(robot.generalized_acceleration());
        let n = qd.len();
        (
            Self {
                robot: robot.index(),
                inverse_mass: inertia.inverse,
                free_velocity: qd + qdd * dt,
                delta: DVector::zeros(n),
            },
            inertia.regularized_pivot,
        )
    }
}

/// Largest impulse and velocity change produced by one local solve or sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImpulseUpdate {
    pub impulse: f64,
    pub velocity: f64,
}

impl ImpulseUpdate {
    pub fn merge(&mut self, other: ImpulseUpdate) {
        self.impulse = self.impulse.max(other.impulse);
        self.velocity = self.velocity.max(other.velocity);
    }

    fn below(&self, tolerance: f64) -> bool {
        self.impulse < tolerance || self.velocity < tolerance
    }
}

#[derive(Debug, Clone)]
enum Calculator {
    Contact(ContactImpulseCalculator),
    Limits(JointLimitCalculator),
}

impl Calculator {
    fn solve(&mut self, blocks: &mut [RobotBlock], relaxation: f64) -> ImpulseUpdate {
        match self {
            Calculator::Contact(c) => c.solve(blocks, relaxation),
            Calculator::Limits(c) => c.solve(blocks, relaxation),
        }
    }

    fn active_constraints(&self) -> usize {
        match self {
            Calculator::Contact(c) => usize::from(c.is_active()),
            Calculator::Limits(c) => c.len(),
        }
    }
}

/// Outcome of solving one group (or one uncovered robot's joint limits).
#[derive(Debug, Clone, Default)]
pub struct GroupSolution {
    /// Group index in this tick, `None` for an uncovered robot.
    pub group: Option<usize>,
    /// Generalized velocity change per robot index.
    pub robot_deltas: Vec<(usize, Vec<f64>)>,
    pub contact_impulses: Vec<ContactImpulse>,
    pub iterations: usize,
    pub converged: bool,
    pub residual: f64,
    pub degradations: Vec<Degradation>,
}

impl GroupSolution {
    /// Adds each robot's velocity change into its joints' delta channels.
    pub fn write_joint_delta_velocities(&self, robots: &mut [Robot]) {
        for (robot, delta) in &self.robot_deltas {
            robots[*robot].add_delta_velocities(delta);
        }
    }
}

/// Impulse solver over the contacts and joint limits of one collision group.
#[derive(Debug, Clone)]
pub struct MultiContactImpulseCalculator {
    group: Option<usize>,
    blocks: Vec<RobotBlock>,
    calculators: Vec<Calculator>,
    smallest_pivot: Option<f64>,
    iterations: usize,
    residual: f64,
    converged: bool,
}

impl MultiContactImpulseCalculator {
    /// Predicts free velocities, computes `M⁻¹` per robot and builds one
    /// calculator per contact point plus one per robot with active limits.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        group_index: Option<usize>,
        robot_indices: &[usize],
        collision_indices: &[usize],
        robots: &[Robot],
        collisions: &[Collision],
        contact: &ContactParameters,
        constraint: &ConstraintParameters,
        dt: f64,
    ) -> Self {
        let mut smallest_pivot: Option<f64> = None;
        let mut note_pivot = |pivot: f64| {
            smallest_pivot = Some(smallest_pivot.map_or(pivot, |p| p.min(pivot)));
        };

        let mut blocks = Vec::with_capacity(robot_indices.len());
        for &index in robot_indices {
            let (block, pivot) = RobotBlock::new(&robots[index], contact.regularization, dt);
            if let Some(pivot) = pivot {
                note_pivot(pivot);
            }
            blocks.push(block);
        }
        let block_of = |robot: usize| robot_indices.binary_search(&robot).ok();

        let mut calculators = Vec::new();
        for &collision_index in collision_indices {
            let collision = &collisions[collision_index];
            for (point_index, point) in collision.points.iter().enumerate() {
                let calculator = ContactImpulseCalculator::new(
                    collision_index,
                    point_index,
                    collision,
                    point,
                    robots,
                    &blocks,
                    block_of,
                    dt,
                );
                if let Some(pivot) = calculator.instability() {
                    note_pivot(pivot);
                }
                calculators.push(Calculator::Contact(calculator));
            }
        }
        for (block_index, block) in blocks.iter().enumerate() {
            let robot = &robots[block.robot];
            if let Some(limits) = JointLimitCalculator::new(robot, block_index, block, constraint, dt) {
                calculators.push(Calculator::Limits(limits));
            }
        }

        Self {
            group: group_index,
            blocks,
            calculators,
            smallest_pivot,
            iterations: 0,
            residual: 0.0,
            converged: false,
        }
    }

    pub fn calculator_count(&self) -> usize {
        self.calculators.len()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn sweep(&mut self, relaxation: f64) -> ImpulseUpdate {
        let mut update = ImpulseUpdate::default();
        for calculator in &mut self.calculators {
            update.merge(calculator.solve(&mut self.blocks, relaxation));
        }
        self.iterations += 1;
        self.residual = update.impulse;
        update
    }

    /// Runs the relaxed sweeps until the updates fall below tolerance.
    pub fn compute_impulses(&mut self, params: &SolverParameters) {
        let active: usize = self
            .calculators
            .iter()
            .map(Calculator::active_constraints)
            .sum();
        if active == 0 {
            self.converged = true;
            return;
        }

        let mut relaxation = 1.0;
        for _ in 0..params.max_iterations {
            let update = self.sweep(relaxation);
            // A lone constraint is solved exactly by its unrelaxed first sweep.
            if active <= 1 || update.below(params.tolerance) {
                self.converged = true;
                return;
            }
            relaxation =
                params.relaxation_min + params.relaxation_decay * (relaxation - params.relaxation_min);
        }

        if params.strict {
            log::debug!(
                "group {:?}: not converged after {} sweeps, extending",
                self.group,
                self.iterations
            );
            for _ in 0..params.max_iterations * STRICT_BUDGET_FACTOR {
                if self.sweep(params.relaxation_min).below(params.tolerance) {
                    self.converged = true;
                    return;
                }
            }
        }
    }

    pub fn contact_impulses(&self) -> impl Iterator<Item = ContactImpulse> + '_ {
        self.calculators.iter().filter_map(|c| match c {
            Calculator::Contact(c) => Some(c.report()),
            Calculator::Limits(_) => None,
        })
    }

    pub fn into_solution(self) -> GroupSolution {
        let mut degradations = Vec::new();
        if let Some(pivot) = self.smallest_pivot {
            degradations.push(Degradation::NumericalInstability {
                group: self.group,
                pivot,
            });
        }
        if let (false, Some(group)) = (self.converged, self.group) {
            degradations.push(Degradation::Nonconvergence {
                group,
                iterations: self.iterations,
                residual: self.residual,
            });
        }

        GroupSolution {
            group: self.group,
            contact_impulses: self.contact_impulses().collect(),
            robot_deltas: self
                .blocks
                .iter()
                .map(|b| (b.robot, b.delta.as_slice().to_vec()))
                .collect(),
            iterations: self.iterations,
            converged: self.converged,
            residual: self.residual,
            degradations,
        }
    }
}

/// Solves the contacts and joint limits of one group against a read-only view of the robots.
#[allow(clippy::too_many_arguments)]
pub fn solve_group(
    group_index: usize,
    group: &CollisionGroup,
    robots: &[Robot],
    collisions: &[Collision],
    contact: &ContactParameters,
    constraint: &ConstraintParameters,
    solver: &SolverParameters,
    dt: f64,
) -> GroupSolution {
    let mut calculator = MultiContactImpulseCalculator::new(
        Some(group_index),
        &group.robots,
        &group.collisions,
        robots,
        collisions,
        contact,
        constraint,
        dt,
    );
    calculator.compute_impulses(solver);
    calculator.into_solution()
}

/// Joint-limit pass for a robot outside every collision group.
///
/// Returns `None` when no limit is active.
pub fn solve_joint_limits(
    robot: &Robot,
    contact: &ContactParameters,
    constraint: &ConstraintParameters,
    solver: &SolverParameters,
    dt: f64,
) -> Option<GroupSolution> {
    let (block, pivot) = RobotBlock::new(robot, contact.regularization, dt);
    let limits = JointLimitCalculator::new(robot, 0, &block, constraint, dt)?;
    let mut calculator = MultiContactImpulseCalculator {
        group: None,
        blocks: vec![block],
        calculators: vec![Calculator::Limits(limits)],
        smallest_pivot: pivot,
        iterations: 0,
        residual: 0.0,
        converged: false,
    };
    calculator.compute_impulses(solver);
    Some(calculator.into_solution())
}
