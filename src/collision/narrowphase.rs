use glam::{DMat3, DVec3};

use super::{
    contact::ContactPoint,
    gjk::{GJKAlgorithm, PlacedShape},
};
use crate::core::{collider::Shape, types::Pose};

/// Tolerance for vertex containment and duplicate detection.
const CONTAINMENT_TOLERANCE: f64 = 1e-9;

/// Narrow-phase dispatcher: analytic tests for common pairs, GJK/EPA otherwise.
///
/// Every returned point has its normal pointing from A towards B and a
/// positive depth.
pub struct NarrowPhase;

impl NarrowPhase {
    pub fn collide(shape_a: &Shape, pose_a: &Pose, shape_b: &Shape, pose_b: &Pose) -> Vec<ContactPoint> {
        match (shape_a, shape_b) {
            (Shape::Plane, Shape::Plane) => Vec::new(),
            (_, Shape::Plane) => Self::shape_plane(shape_a, pose_a, pose_b),
            (Shape::Plane, _) => flip(Self::shape_plane(shape_b, pose_b, pose_a)),
            (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
                sphere_sphere(pose_a.position, *ra, pose_b.position, *rb)
                    .into_iter()
                    .collect()
            }
            (Shape::Sphere { radius }, Shape::Box { half_extents }) => {
                sphere_box(pose_a.position, *radius, pose_b, *half_extents)
                    .into_iter()
                    .collect()
            }
            (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
                flip(sphere_box(pose_b.position, *radius, pose_a, *half_extents).into_iter().collect())
            }
            (Shape::Sphere { radius }, Shape::Capsule { radius: rc, height }) => {
                let (p0, p1) = capsule_segment(pose_b, *height);
                let q = closest_point_on_segment(pose_a.position, p0, p1);
                sphere_sphere(pose_a.position, *radius, q, *rc).into_iter().collect()
            }
            (Shape::Capsule { radius: rc, height }, Shape::Sphere { radius }) => {
                let (p0, p1) = capsule_segment(pose_a, *height);
                let q = closest_point_on_segment(pose_b.position, p0, p1);
                sphere_sphere(q, *rc, pose_b.position, *radius).into_iter().collect()
            }
            (
                Shape::Capsule { radius: ra, height: ha },
                Shape::Capsule { radius: rb, height: hb },
            ) => {
                let (a0, a1) = capsule_segment(pose_a, *ha);
                let (b0, b1) = capsule_segment(pose_b, *hb);
                let (pa, pb) = closest_points_between_segments(a0, a1, b0, b1);
                sphere_sphere(pa, *ra, pb, *rb).into_iter().collect()
            }
            (Shape::Box { half_extents: ha }, Shape::Box { half_extents: hb }) => {
                box_box(pose_a, *ha, pose_b, *hb)
            }
            _ => GJKAlgorithm::intersect(
                &PlacedShape::new(shape_a, pose_a),
                &PlacedShape::new(shape_b, pose_b),
            )
            .filter(|c| c.depth > 0.0)
            .into_iter()
            .collect(),
        }
    }

    /// Convex shape A against the half-space B.
    fn shape_plane(shape: &Shape, pose: &Pose, plane_pose: &Pose) -> Vec<ContactPoint> {
        let plane_normal = plane_pose.transform_vector(DVec3::Z);
        let origin = plane_pose.position;
        let mut points = Vec::new();
        let mut consider = |deepest: DVec3| {
            let signed = plane_normal.dot(deepest - origin);
            if signed < 0.0 {
                points.push(ContactPoint::new(
                    deepest - plane_normal * (0.5 * signed),
                    -plane_normal,
                    -signed,
                ));
            }
        };

        match shape {
            Shape::Sphere { radius } => consider(pose.position - plane_normal * *radius),
            Shape::Box { half_extents } => {
                for corner in box_corners(pose, *half_extents) {
                    consider(corner);
                }
            }
            Shape::Capsule { radius, height } => {
                let (p0, p1) = capsule_segment(pose, *height);
                consider(p0 - plane_normal * *radius);
                consider(p1 - plane_normal * *radius);
            }
            Shape::Cylinder { radius, height } => {
                let axis = pose.transform_vector(DVec3::Y);
                let down = -plane_normal;
                let radial = down - axis * down.dot(axis);
                let rim: Vec<DVec3> = if radial.length_squared() > 1e-12 {
                    vec![radial.normalize() * *radius]
                } else {
                    // Flat on the plane: four rim points keep it from rocking.
                    [DVec3::X, DVec3::Z, -DVec3::X, -DVec3::Z]
                        .iter()
                        .map(|d| pose.transform_vector(*d) * *radius)
                        .collect()
                };
                for cap in [-0.5 * height, 0.5 * height] {
                    let center = pose.position + axis * cap;
                    for offset in &rim {
                        consider(center + *offset);
                    }
                }
            }
            Shape::ConvexHull { vertices } => {
                for v in vertices {
                    consider(pose.transform_point(*v));
                }
            }
            Shape::Plane => {}
        }
        points
    }
}

fn flip(points: Vec<ContactPoint>) -> Vec<ContactPoint> {
    points.into_iter().map(ContactPoint::flipped).collect()
}

fn sphere_sphere(center_a: DVec3, radius_a: f64, center_b: DVec3, radius_b: f64) -> Option<ContactPoint> {
    let delta = center_b - center_a;
    let distance = delta.length();
    let depth = radius_a + radius_b - distance;
    if depth <= 0.0 {
        return None;
    }
    let normal = if distance > 1e-12 { delta / distance } else { DVec3::Z };
    Some(ContactPoint::new(
        center_a + normal * (radius_a - 0.5 * depth),
        normal,
        depth,
    ))
}

fn sphere_box(center: DVec3, radius: f64, box_pose: &Pose, half_extents: DVec3) -> Option<ContactPoint> {
    let local = box_pose.inverse_transform_point(center);
    let clamped = local.clamp(-half_extents, half_extents);
    if local != clamped {
        let closest = box_pose.transform_point(clamped);
        let delta = closest - center;
        let distance = delta.length();
        let depth = radius - distance;
        if depth <= 0.0 || distance < 1e-12 {
            return None;
        }
        let normal = delta / distance;
        return Some(ContactPoint::new(
            center + normal * (radius - 0.5 * depth),
            normal,
            depth,
        ));
    }

    // Center inside the box: push out through the nearest face.
    let face_gap = half_extents - local.abs();
    let axis = if face_gap.x <= face_gap.y && face_gap.x <= face_gap.z {
        0
    } else if face_gap.y <= face_gap.z {
        1
    } else {
        2
    };
    let mut face_normal = DVec3::ZERO;
    face_normal[axis] = if local[axis] >= 0.0 { 1.0 } else { -1.0 };
    let normal = -box_pose.transform_vector(face_normal);
    Some(ContactPoint::new(center, normal, radius + face_gap[axis]))
}

fn capsule_segment(pose: &Pose, height: f64) -> (DVec3, DVec3) {
    let half = pose.transform_vector(DVec3::Y * (0.5 * height));
    (pose.position - half, pose.position + half)
}

fn closest_point_on_segment(point: DVec3, a: DVec3, b: DVec3) -> DVec3 {
    let ab = b - a;
    let length_sq = ab.length_squared();
    if length_sq < 1e-18 {
        return a;
    }
    let t = ((point - a).dot(ab) / length_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest points between segments `p1-q1` and `p2-q2`.
fn closest_points_between_segments(p1: DVec3, q1: DVec3, p2: DVec3, q2: DVec3) -> (DVec3, DVec3) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a < 1e-18 && e < 1e-18 {
        return (p1, p2);
    }
    let (s, t) = if a < 1e-18 {
        (0.0, (f / e).clamp(0.0, 1.0))
    } else {
        let c = d1.dot(r);
        if e < 1e-18 {
            ((-c / a).clamp(0.0, 1.0), 0.0)
        } else {
            let b = d1.dot(d2);
            let denom = a * e - b * b;
            let mut s = if denom > 1e-18 {
                ((b * f - c * e) / denom).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let mut t = (b * s + f) / e;
            if t < 0.0 {
                t = 0.0;
                s = (-c / a).clamp(0.0, 1.0);
            } else if t > 1.0 {
                t = 1.0;
                s = ((b - c) / a).clamp(0.0, 1.0);
            }
            (s, t)
        }
    };
    (p1 + d1 * s, p2 + d2 * t)
}

fn box_corners(pose: &Pose, half_extents: DVec3) -> [DVec3; 8] {
    let mut corners = [DVec3::ZERO; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        let sign = DVec3::new(
            if i & 1 == 0 { -1.0 } else { 1.0 },
            if i & 2 == 0 { -1.0 } else { 1.0 },
            if i & 4 == 0 { -1.0 } else { 1.0 },
        );
        *corner = pose.transform_point(sign * half_extents);
    }
    corners
}

fn projected_extent(axes: &DMat3, half_extents: DVec3, axis: DVec3) -> f64 {
    axes.x_axis.dot(axis).abs() * half_extents.x
        + axes.y_axis.dot(axis).abs() * half_extents.y
        + axes.z_axis.dot(axis).abs() * half_extents.z
}

fn contains_point(pose: &Pose, half_extents: DVec3, point: DVec3) -> bool {
    let local = pose.inverse_transform_point(point).abs();
    let slack = DVec3::splat(CONTAINMENT_TOLERANCE) * half_extents.max_element().max(1.0);
    local.cmple(half_extents + slack).all()
}

/// Separating-axis test over the 15 box axes, then vertex containment for the manifold.
fn box_box(pose_a: &Pose, ha: DVec3, pose_b: &Pose, hb: DVec3) -> Vec<ContactPoint> {
    let axes_a = pose_a.rotation_matrix();
    let axes_b = pose_b.rotation_matrix();
    let relative_pos = pose_b.position - pose_a.position;

    let mut test_axes = Vec::with_capacity(15);
    test_axes.extend_from_slice(&[axes_a.x_axis, axes_a.y_axis, axes_a.z_axis]);
    test_axes.extend_from_slice(&[axes_b.x_axis, axes_b.y_axis, axes_b.z_axis]);
    for axis_a in [axes_a.x_axis, axes_a.y_axis, axes_a.z_axis] {
        for axis_b in [axes_b.x_axis, axes_b.y_axis, axes_b.z_axis] {
            let axis = axis_a.cross(axis_b);
            if axis.length_squared() > 1e-10 {
                test_axes.push(axis.normalize());
            }
        }
    }

    let mut min_overlap = f64::INFINITY;
    let mut normal = DVec3::Z;
    for axis in test_axes {
        let projection = relative_pos.dot(axis);
        let overlap = projected_extent(&axes_a, ha, axis) + projected_extent(&axes_b, hb, axis)
            - projection.abs();
        if overlap < 0.0 {
            return Vec::new();
        }
        // Small bias keeps face axes ahead of nearly equal edge axes.
        if overlap < min_overlap - 1e-12 {
            min_overlap = overlap;
            normal = if projection < 0.0 { -axis } else { axis };
        }
    }

    let top_of_a = pose_a.position.dot(normal) + projected_extent(&axes_a, ha, normal);
    let bottom_of_b = pose_b.position.dot(normal) - projected_extent(&axes_b, hb, normal);
    let mut points: Vec<ContactPoint> = Vec::new();

    for v in box_corners(pose_b, hb) {
        let depth = top_of_a - v.dot(normal);
        if depth > 0.0 && contains_point(pose_a, ha, v) {
            points.push(ContactPoint::new(v + normal * (0.5 * depth), normal, depth));
        }
    }
    for v in box_corners(pose_a, ha) {
        let depth = v.dot(normal) - bottom_of_b;
        if depth > 0.0 && contains_point(pose_b, hb, v) {
            let position = v - normal * (0.5 * depth);
            let duplicate = points
                .iter()
                .any(|p| p.position.distance_squared(position) < CONTAINMENT_TOLERANCE);
            if !duplicate {
                points.push(ContactPoint::new(position, normal, depth));
            }
        }
    }

    if points.is_empty() && min_overlap > 0.0 {
        // Edge-edge contact.
        let placed_a = PlacedShape::new(&Shape::Box { half_extents: ha }, pose_a).support(normal);
        let placed_b = PlacedShape::new(&Shape::Box { half_extents: hb }, pose_b).support(-normal);
        points.push(ContactPoint::new(0.5 * (placed_a + placed_b), normal, min_overlap));
    }
    points
}
