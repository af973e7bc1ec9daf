use glam::DVec3;

use super::contact::ContactPoint;
use crate::core::{collider::Shape, types::Pose};

/// Convex shape placed in the world, queried through its support mapping.
#[derive(Debug, Clone, Copy)]
pub struct PlacedShape<'a> {
    pub shape: &'a Shape,
    pub pose: &'a Pose,
}

impl<'a> PlacedShape<'a> {
    pub fn new(shape: &'a Shape, pose: &'a Pose) -> Self {
        Self { shape, pose }
    }

    pub fn support(&self, direction: DVec3) -> DVec3 {
        let local = self.pose.inverse_transform_vector(direction);
        self.pose.transform_point(self.shape.support_local(local))
    }

    fn minkowski_support(a: &PlacedShape, b: &PlacedShape, direction: DVec3) -> DVec3 {
        a.support(direction) - b.support(-direction)
    }
}

/// Gilbert-Johnson-Keerthi (GJK) intersection test with EPA penetration depth.
pub struct GJKAlgorithm;

impl GJKAlgorithm {
    const MAX_ITERATIONS: usize = 64;
    const EPSILON: f64 = 1e-12;

    /// Deepest contact between two convex shapes, normal pointing from A to B.
    pub fn intersect(a: &PlacedShape, b: &PlacedShape) -> Option<ContactPoint> {
        let mut simplex: Vec<DVec3> = Vec::with_capacity(4);
        let relative_pos = b.pose.position - a.pose.position;
        let mut direction = relative_pos;
        if direction.length_squared() < Self::EPSILON {
            direction = DVec3::X;
        }

        for _ in 0..Self::MAX_ITERATIONS {
            let point = PlacedShape::minkowski_support(a, b, direction);
            if point.dot(direction) < 0.0 {
                return None;
            }

            simplex.push(point);
            if Self::contains_origin(&mut simplex, &mut direction) {
                let (depth, mut normal) = EPAAlgorithm::compute_penetration(&simplex, a, b)?;

                // Keep the A to B convention even for nearly touching shapes.
                if normal.dot(relative_pos) < 0.0 && depth < 1e-9 {
                    normal = -normal;
                }

                let position = a.support(normal) - normal * (depth * 0.5);
                return Some(ContactPoint::new(position, normal, depth));
            }
            if direction.length_squared() < Self::EPSILON {
                // Origin on the simplex boundary: touching, no penetration.
                return None;
            }
        }

        None
    }

    fn contains_origin(simplex: &mut Vec<DVec3>, direction: &mut DVec3) -> bool {
        match simplex.len() {
            1 => {
                *direction = -simplex[0];
                false
            }
            2 => {
                let a = simplex[1];
                let b = simplex[0];
                let ab = b - a;
                let ao = -a;

                let dir = ab.cross(ao).cross(ab);
                if dir.length_squared() < Self::EPSILON {
                    // Origin is on the line AB. Pick a direction perpendicular to AB.
                    let axis = if ab.x.abs() < 0.1 { DVec3::X } else { DVec3::Y };
                    *direction = ab.cross(axis);
                } else {
                    *direction = dir;
                }
                false
            }
            3 => {
                let a = simplex[2];
                let b = simplex[1];
                let c = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ao = -a;
                let abc = ab.cross(ac);

                if abc.cross(ac).dot(ao) > 0.0 {
                    simplex.remove(1);
                    *direction = ac.cross(ao).cross(ac);
                } else if ab.cross(abc).dot(ao) > 0.0 {
                    simplex.remove(0);
                    *direction = ab.cross(ao).cross(ab);
                } else if abc.length_squared() < Self::EPSILON {
                    // Degenerate triangle.
                    simplex.remove(0);
                    *direction = ab.any_orthogonal_vector();
                } else if abc.dot(ao) > 0.0 {
                    *direction = abc;
                } else {
                    // Wind the triangle so its normal faces the origin.
                    simplex.swap(0, 1);
                    *direction = -abc;
                }
                false
            }
            4 => {
                let a = simplex[3];
                let b = simplex[2];
                let c = simplex[1];
                let d = simplex[0];
                let ab = b - a;
                let ac = c - a;
                let ad = d - a;
                let ao = -a;
                let abc = ab.cross(ac);
                let acd = ac.cross(ad);
                let adb = ad.cross(ab);

                if abc.dot(ao) > 0.0 {
                    *simplex = vec![c, b, a];
                    *direction = abc;
                    false
                } else if acd.dot(ao) > 0.0 {
                    *simplex = vec![d, c, a];
                    *direction = acd;
                    false
                } else if adb.dot(ao) > 0.0 {
                    *simplex = vec![b, d, a];
                    *direction = adb;
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }
}

/// Expanding Polytope Algorithm for penetration depth calculation.
struct EPAAlgorithm;

impl EPAAlgorithm {
    const MAX_ITERATIONS: usize = 64;
    const TOLERANCE: f64 = 1e-9;

    fn compute_penetration(
        simplex: &[DVec3],
        a: &PlacedShape,
        b: &PlacedShape,
    ) -> Option<(f64, DVec3)> {
        if simplex.len() < 4 {
            return None;
        }

        let mut polytope = simplex.to_vec();
        let mut faces = Self::build_initial_faces(&polytope);

        for _ in 0..Self::MAX_ITERATIONS {
            let (min_dist, normal) = Self::find_closest_face(&polytope, &faces)?;

            let support = PlacedShape::minkowski_support(a, b, normal);
            let distance = support.dot(normal);

            // Converged once the new support point no longer expands the polytope.
            if distance - min_dist < Self::TOLERANCE {
                return Some((min_dist, normal));
            }

            Self::expand_polytope(&mut polytope, &mut faces, support);
        }

        // Max iterations reached, return best estimate.
        Self::find_closest_face(&polytope, &faces)
    }

    fn build_initial_faces(polytope: &[DVec3]) -> Vec<(usize, usize, usize)> {
        let mut faces = vec![(0, 1, 2), (0, 2, 3), (0, 3, 1), (1, 3, 2)];

        // Orient every face normal away from the origin, which is inside.
        for face in &mut faces {
            let ab = polytope[face.1] - polytope[face.0];
            let ac = polytope[face.2] - polytope[face.0];
            let normal = ab.cross(ac);
            if polytope[face.0].dot(normal) < 0.0 {
                std::mem::swap(&mut face.1, &mut face.2);
            }
        }
        faces
    }

    fn find_closest_face(
        polytope: &[DVec3],
        faces: &[(usize, usize, usize)],
    ) -> Option<(f64, DVec3)> {
        let mut best: Option<(f64, DVec3)> = None;

        for &(a, b, c) in faces {
            let ab = polytope[b] - polytope[a];
            let ac = polytope[c] - polytope[a];
            let normal = ab.cross(ac).normalize_or_zero();
            if normal == DVec3::ZERO {
                continue;
            }

            let dist = polytope[a].dot(normal);
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, normal));
            }
        }

        best.map(|(d, n)| (d.max(0.0), n))
    }

    fn expand_polytope(
        polytope: &mut Vec<DVec3>,
        faces: &mut Vec<(usize, usize, usize)>,
        support: DVec3,
    ) {
        let new_idx = polytope.len();
        polytope.push(support);

        let mut edges = Vec::new();
        let mut i = 0;
        while i < faces.len() {
            let (a, b, c) = faces[i];
            let ab = polytope[b] - polytope[a];
            let ac = polytope[c] - polytope[a];
            let normal = ab.cross(ac).normalize_or_zero();

            if normal.dot(support - polytope[a]) > 0.0 {
                edges.push((a, b));
                edges.push((b, c));
                edges.push((c, a));
                faces.swap_remove(i);
            } else {
                i += 1;
            }
        }

        let mut boundary_edges: Vec<(usize, usize)> = Vec::new();
        for (u, v) in edges {
            if let Some(j) = boundary_edges.iter().position(|&e| e == (v, u)) {
                boundary_edges.remove(j);
            } else {
                boundary_edges.push((u, v));
            }
        }

        for (u, v) in boundary_edges {
            faces.push((u, v, new_idx));
        }
    }
}
