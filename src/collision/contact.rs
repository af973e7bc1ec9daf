use glam::DVec3;

use crate::{config::ContactParameters, core::collider::CollidableOwner};

/// Stable identity of a collidable within one tick.
///
/// Orders robots before terrain, then by robot index and slot, which is the
/// order collisions are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollidableId {
    Robot { robot: usize, slot: usize },
    Terrain { slot: usize },
}

impl CollidableId {
    pub fn robot(&self) -> Option<usize> {
        match self {
            CollidableId::Robot { robot, .. } => Some(*robot),
            CollidableId::Terrain { .. } => None,
        }
    }
}

/// One point of contact between two collidables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPoint {
    /// World position, midway between the two surfaces.
    pub position: DVec3,
    /// Unit normal pointing from A towards B.
    pub normal: DVec3,
    /// Penetration depth, positive when overlapping.
    pub depth: f64,
}

impl ContactPoint {
    pub fn new(position: DVec3, normal: DVec3, depth: f64) -> Self {
        Self {
            position,
            normal,
            depth,
        }
    }

    pub(crate) fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }
}

/// Narrow-phase result for one collidable pair in one tick.
///
/// B is always the terrain side of a robot/terrain pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub id_a: CollidableId,
    pub id_b: CollidableId,
    pub owner_a: CollidableOwner,
    pub owner_b: CollidableOwner,
    pub points: Vec<ContactPoint>,
    /// Contact parameters in effect when the pair was detected.
    pub parameters: ContactParameters,
}

impl Collision {
    pub fn max_depth(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p.depth)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Robot on side A; side A is never terrain.
    pub fn robot_a(&self) -> Option<usize> {
        self.owner_a.robot()
    }

    pub fn robot_b(&self) -> Option<usize> {
        self.owner_b.robot()
    }

    /// Partition edge: `(a, b)`, or `(a, a)` for terrain and self collisions.
    pub fn edge(&self) -> Option<(usize, usize)> {
        let a = self.robot_a()?;
        Some((a, self.robot_b().unwrap_or(a)))
    }
}

/// Impulse applied at one contact point in the last tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactImpulse {
    /// Index of the collision in the tick's collision list.
    pub collision: usize,
    /// Index of the point within that collision.
    pub point: usize,
    pub position: DVec3,
    pub normal: DVec3,
    /// World-frame impulse applied to side B; side A receives the opposite.
    pub impulse: DVec3,
}

impl ContactImpulse {
    pub fn normal_component(&self) -> f64 {
        self.impulse.dot(self.normal)
    }

    pub fn tangential_component(&self) -> DVec3 {
        self.impulse - self.normal * self.normal_component()
    }
}
