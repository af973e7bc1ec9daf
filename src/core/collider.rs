use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::types::Pose;
use crate::error::ConfigurationError;

/// Enumeration of supported collision geometries, in the shape frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere { radius: f64 },
    Box { half_extents: DVec3 },
    /// Segment of length `height` along local Y, swept by `radius`.
    Capsule { radius: f64, height: f64 },
    /// Axis along local Y.
    Cylinder { radius: f64, height: f64 },
    ConvexHull { vertices: Vec<DVec3> },
    /// Half-space below the local XY plane; the outward normal is local +Z.
    Plane,
}

impl Shape {
    pub fn sphere(radius: f64) -> Self {
        Shape::Sphere { radius }
    }

    pub fn cuboid(half_extents: DVec3) -> Self {
        Shape::Box { half_extents }
    }

    pub fn capsule(radius: f64, height: f64) -> Self {
        Shape::Capsule { radius, height }
    }

    pub fn cylinder(radius: f64, height: f64) -> Self {
        Shape::Cylinder { radius, height }
    }

    pub fn convex_hull(vertices: Vec<DVec3>) -> Self {
        Shape::ConvexHull { vertices }
    }

    pub fn validate(&self, owner: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidShape {
            owner: owner.to_string(),
            reason: reason.to_string(),
        };
        let positive = |v: f64| v > 0.0 && v.is_finite();
        match self {
            Shape::Sphere { radius } if !positive(*radius) => Err(invalid("radius must be > 0")),
            Shape::Box { half_extents }
                if !(positive(half_extents.x)
                    && positive(half_extents.y)
                    && positive(half_extents.z)) =>
            {
                Err(invalid("half extents must be > 0"))
            }
            Shape::Capsule { radius, height } | Shape::Cylinder { radius, height }
                if !positive(*radius) || !(*height >= 0.0 && height.is_finite()) =>
            {
                Err(invalid("radius must be > 0 and height >= 0"))
            }
            Shape::ConvexHull { vertices } if vertices.len() < 4 => {
                Err(invalid("convex hull needs at least 4 vertices"))
            }
            Shape::ConvexHull { vertices } if vertices.iter().any(|v| !v.is_finite()) => {
                Err(invalid("convex hull vertices must be finite"))
            }
            _ => Ok(()),
        }
    }

    /// World bounding box of the shape placed at `pose`.
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        let rotation = pose.rotation_matrix();
        let center = pose.position;
        match self {
            Shape::Sphere { radius } => Aabb::from_center_half_extents(center, DVec3::splat(*radius)),
            Shape::Box { half_extents } => {
                let abs = glam::DMat3::from_cols(
                    rotation.x_axis.abs(),
                    rotation.y_axis.abs(),
                    rotation.z_axis.abs(),
                );
                Aabb::from_center_half_extents(center, abs * *half_extents)
            }
            Shape::Capsule { radius, height } => {
                let half_segment = (rotation.y_axis * (0.5 * height)).abs();
                Aabb::from_center_half_extents(center, half_segment + DVec3::splat(*radius))
            }
            Shape::Cylinder { radius, height } => {
                let axis = rotation.y_axis;
                let half_segment = (axis * (0.5 * height)).abs();
                let disk = (DVec3::ONE - axis * axis).max(DVec3::ZERO);
                let disk = DVec3::new(disk.x.sqrt(), disk.y.sqrt(), disk.z.sqrt()) * *radius;
                Aabb::from_center_half_extents(center, half_segment + disk)
            }
            Shape::ConvexHull { vertices } => {
                let mut bounds = Aabb::empty();
                for v in vertices {
                    bounds.extend(pose.transform_point(*v));
                }
                bounds
            }
            Shape::Plane => {
                let normal = rotation.z_axis;
                let mut bounds = Aabb::infinite();
                for axis in 0..3 {
                    if (normal[axis].abs() - 1.0).abs() < 1e-12 {
                        if normal[axis] > 0.0 {
                            bounds.max[axis] = center[axis];
                        } else {
                            bounds.min[axis] = center[axis];
                        }
                    }
                }
                bounds
            }
        }
    }

    /// Farthest point of the shape along `direction`, in the shape frame.
    pub fn support_local(&self, direction: DVec3) -> DVec3 {
        let dir = direction.normalize_or_zero();
        match self {
            Shape::Sphere { radius } => dir * *radius,
            Shape::Box { half_extents } => DVec3::new(
                half_extents.x.copysign(direction.x),
                half_extents.y.copysign(direction.y),
                half_extents.z.copysign(direction.z),
            ),
            Shape::Capsule { radius, height } => {
                DVec3::Y * (0.5 * height).copysign(direction.y) + dir * *radius
            }
            Shape::Cylinder { radius, height } => {
                let lateral = DVec3::new(direction.x, 0.0, direction.z).normalize_or_zero();
                lateral * *radius + DVec3::Y * (0.5 * height).copysign(direction.y)
            }
            Shape::ConvexHull { vertices } => vertices
                .iter()
                .copied()
                .fold((DVec3::ZERO, f64::NEG_INFINITY), |(best, best_dot), v| {
                    let d = v.dot(direction);
                    if d > best_dot {
                        (v, d)
                    } else {
                        (best, best_dot)
                    }
                })
                .0,
            // Planes never reach the GJK path.
            Shape::Plane => DVec3::ZERO,
        }
    }
}

/// Axis-aligned bounding box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    pub fn infinite() -> Self {
        Self {
            min: DVec3::splat(f64::NEG_INFINITY),
            max: DVec3::splat(f64::INFINITY),
        }
    }

    pub fn from_center_half_extents(center: DVec3, half_extents: DVec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn extend(&mut self, point: DVec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min: self.min - DVec3::splat(margin),
            max: self.max + DVec3::splat(margin),
        }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// Simple collision filtering mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub layer: u32,
    pub mask: u32,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self {
            layer: 1,
            mask: u32::MAX,
        }
    }
}

impl CollisionFilter {
    pub fn new(layer: u32, mask: u32) -> Self {
        Self { layer, mask }
    }

    pub fn accepts(&self, other: &CollisionFilter) -> bool {
        (self.mask & other.layer) != 0 && (other.mask & self.layer) != 0
    }
}

/// Who a collidable is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollidableOwner {
    Robot { robot: usize, body: usize },
    Terrain { object: usize },
}

impl CollidableOwner {
    pub fn robot(&self) -> Option<usize> {
        match self {
            CollidableOwner::Robot { robot, .. } => Some(*robot),
            CollidableOwner::Terrain { .. } => None,
        }
    }

    pub fn is_terrain(&self) -> bool {
        matches!(self, CollidableOwner::Terrain { .. })
    }
}

/// A shape attached to a body or to the static world, with its cached world bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct Collidable {
    pub owner: CollidableOwner,
    /// Shape frame relative to the owning body (or world, for terrain).
    pub local_pose: Pose,
    pub shape: Shape,
    pub filter: CollisionFilter,
    pub world_pose: Pose,
    pub aabb: Aabb,
}

impl Collidable {
    pub fn new(owner: CollidableOwner, local_pose: Pose, shape: Shape, filter: CollisionFilter) -> Self {
        let mut collidable = Self {
            owner,
            local_pose,
            shape,
            filter,
            world_pose: local_pose,
            aabb: Aabb::empty(),
        };
        collidable.update(&Pose::IDENTITY);
        collidable
    }

    /// Recomputes the world pose and bounding box from the owner's pose.
    pub fn update(&mut self, owner_pose: &Pose) {
        self.world_pose = owner_pose.combine(&self.local_pose);
        self.aabb = self.shape.aabb(&self.world_pose);
    }

    pub fn body(&self) -> Option<usize> {
        match self.owner {
            CollidableOwner::Robot { body, .. } => Some(body),
            CollidableOwner::Terrain { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;

    #[test]
    fn rotated_box_bounds_grow() {
        let shape = Shape::cuboid(DVec3::new(1.0, 0.5, 0.5));
        let pose = Pose::from_orientation(DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2));
        let bounds = shape.aabb(&pose);
        assert!(bounds.max.abs_diff_eq(DVec3::new(0.5, 1.0, 0.5), 1e-12));
    }

    #[test]
    fn flat_plane_is_bounded_above() {
        let bounds = Shape::Plane.aabb(&Pose::from_position(DVec3::new(0.0, 0.0, -1.0)));
        assert_eq!(bounds.max.z, -1.0);
        assert_eq!(bounds.min.z, f64::NEG_INFINITY);
        assert_eq!(bounds.max.x, f64::INFINITY);
        let above = Aabb::from_center_half_extents(DVec3::new(5.0, 3.0, 0.0), DVec3::splat(0.5));
        assert!(!bounds.overlaps(&above));
    }

    #[test]
    fn filters_require_mutual_acceptance() {
        let a = CollisionFilter::new(0b01, 0b10);
        let b = CollisionFilter::new(0b10, 0b01);
        let c = CollisionFilter::new(0b10, 0b10);
        assert!(a.accepts(&b));
        assert!(!a.accepts(&c));
    }

    #[test]
    fn degenerate_shapes_are_rejected() {
        assert!(Shape::sphere(0.0).validate("body").is_err());
        assert!(Shape::cuboid(DVec3::new(1.0, -1.0, 1.0)).validate("body").is_err());
        assert!(Shape::convex_hull(vec![DVec3::ZERO; 3]).validate("body").is_err());
        assert!(Shape::capsule(0.1, 0.0).validate("body").is_ok());
    }
}
