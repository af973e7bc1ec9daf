//! Articulated dynamics: forward dynamics, joint-space inertia, collision
//! groups, impulse solvers and integration.

pub mod aba;
pub mod contact_impulse;
pub mod crba;
pub mod integrator;
pub mod island;
pub mod jacobian;
pub mod joint_limit;
pub mod solver;

pub use aba::ForwardDynamicsCalculator;
pub use contact_impulse::ContactImpulseCalculator;
pub use crba::{inverse_dynamics, mass_matrix, JointSpaceInertia};
pub use integrator::Integrator;
pub use island::{partition, CollisionGroup, IslandManager, Partition};
pub use jacobian::point_jacobian;
pub use joint_limit::JointLimitCalculator;
pub use solver::{
    solve_group, solve_joint_limits, GroupSolution, MultiContactImpulseCalculator, RobotBlock,
};
