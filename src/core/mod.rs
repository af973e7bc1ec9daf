//! The multi-body model: joints, rigid bodies, collidables and the robot tree
//! built from a definition.

pub mod collider;
pub mod definition;
pub mod joint;
pub mod rigidbody;
pub mod robot;
pub mod sensor;
pub mod types;

pub use collider::{Aabb, Collidable, CollidableOwner, CollisionFilter, Shape};
pub use joint::{Joint, JointKind};
pub use rigidbody::RigidBody;
pub use robot::Robot;
pub use sensor::{ImuSensor, ImuSensorDefinition};
pub use types::{MassProperties, Pose};
