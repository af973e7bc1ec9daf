//! Collision detection: sort-and-sweep broad phase, analytic and GJK/EPA narrow phase.

pub mod broadphase;
pub mod contact;
pub mod detector;
pub mod gjk;
pub mod narrowphase;

pub use broadphase::BroadPhase;
pub use contact::{CollidableId, Collision, ContactImpulse, ContactPoint};
pub use detector::CollisionDetector;
pub use gjk::{GJKAlgorithm, PlacedShape};
pub use narrowphase::NarrowPhase;
