use super::{
    broadphase::BroadPhase,
    contact::{CollidableId, Collision},
    narrowphase::NarrowPhase,
};
use crate::{
    config::ContactParameters,
    core::{collider::Collidable, robot::Robot},
    utils::allocator::TickArena,
};

/// Broad and narrow phase over every robot and terrain collidable.
#[derive(Debug, Default)]
pub struct CollisionDetector {
    broad_phase: BroadPhase,
}

impl CollisionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes robot bounds and appends this tick's collisions to `out`,
    /// ordered by collidable pair.
    ///
    /// Terrain collidables are static and expected to be up to date.
    pub fn detect(
        &mut self,
        robots: &mut [Robot],
        terrain: &[Collidable],
        params: &ContactParameters,
        out: &mut TickArena<Collision>,
    ) {
        self.broad_phase.clear();
        for robot in robots.iter_mut() {
            robot.update_collidables();
            for (slot, collidable) in robot.collidables.iter().enumerate() {
                self.broad_phase.insert(
                    CollidableId::Robot {
                        robot: robot.index(),
                        slot,
                    },
                    collidable.aabb,
                );
            }
        }
        for (slot, collidable) in terrain.iter().enumerate() {
            self.broad_phase
                .insert(CollidableId::Terrain { slot }, collidable.aabb);
        }

        let robots: &[Robot] = robots;
        let pairs = self
            .broad_phase
            .get_potential_pairs(|a, b| Self::accepts_pair(robots, terrain, a, b));

        for &(id_a, id_b) in pairs {
            let a = lookup(robots, terrain, id_a);
            let b = lookup(robots, terrain, id_b);
            let points = NarrowPhase::collide(&a.shape, &a.world_pose, &b.shape, &b.world_pose);
            if points.is_empty() {
                continue;
            }
            let collision = Collision {
                id_a,
                id_b,
                owner_a: a.owner,
                owner_b: b.owner,
                points,
                parameters: *params,
            };
            if collision.max_depth() < params.minimum_penetration {
                continue;
            }
            out.insert(collision);
        }
        log::trace!(
            "collision detection: {} collidables, {} collisions",
            self.broad_phase.len(),
            out.len()
        );
    }

    fn accepts_pair(
        robots: &[Robot],
        terrain: &[Collidable],
        id_a: CollidableId,
        id_b: CollidableId,
    ) -> bool {
        let (Some(robot_a), robot_b) = (id_a.robot(), id_b.robot()) else {
            // Terrain sorts last, so a terrain A means terrain on both sides.
            return false;
        };
        let a = lookup(robots, terrain, id_a);
        let b = lookup(robots, terrain, id_b);
        if !a.filter.accepts(&b.filter) {
            return false;
        }
        if robot_b != Some(robot_a) {
            return true;
        }

        let robot = &robots[robot_a];
        match (a.body(), b.body()) {
            (Some(body_a), Some(body_b)) => {
                robot.self_collision() && body_a != body_b && !robot.are_adjacent(body_a, body_b)
            }
            _ => false,
        }
    }
}

fn lookup<'a>(robots: &'a [Robot], terrain: &'a [Collidable], id: CollidableId) -> &'a Collidable {
    match id {
        CollidableId::Robot { robot, slot } => &robots[robot].collidables[slot],
        CollidableId::Terrain { slot } => &terrain[slot],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        collider::{CollidableOwner, CollisionFilter, Shape},
        definition::{
            CollisionShapeDefinition, JointDefinition, JointKindDefinition, OneDofJointDefinition,
            RigidBodyDefinition, RobotDefinition,
        },
        types::{MassProperties, Pose},
    };
    use glam::DVec3;

    fn ground() -> Vec<Collidable> {
        vec![Collidable::new(
            CollidableOwner::Terrain { object: 0 },
            Pose::IDENTITY,
            Shape::Plane,
            CollisionFilter::default(),
        )]
    }

    fn ball(index: usize, position: DVec3) -> Robot {
        let def = RobotDefinition::floating_body(
            "ball",
            MassProperties::solid_sphere(1.0, 0.5),
            Some(Shape::sphere(0.5)),
            Pose::from_position(position),
        );
        Robot::from_definition(&def, index).unwrap()
    }

    fn detect(robots: &mut [Robot], terrain: &[Collidable], params: &ContactParameters) -> Vec<Collision> {
        let mut detector = CollisionDetector::new();
        let mut out = TickArena::new();
        detector.detect(robots, terrain, params, &mut out);
        out.values().to_vec()
    }

    #[test]
    fn robot_terrain_collision_puts_terrain_on_side_b() {
        let mut robots = vec![ball(0, DVec3::new(0.0, 0.0, 0.45))];
        let collisions = detect(&mut robots, &ground(), &ContactParameters::default());
        assert_eq!(collisions.len(), 1);
        assert!(collisions[0].owner_b.is_terrain());
        assert_eq!(collisions[0].edge(), Some((0, 0)));
        assert!(collisions[0].points[0].normal.abs_diff_eq(-DVec3::Z, 1e-12));
    }

    #[test]
    fn shallow_overlap_below_minimum_penetration_is_discarded() {
        let mut robots = vec![ball(0, DVec3::new(0.0, 0.0, 0.49999))];
        let params = ContactParameters::default().with_minimum_penetration(1e-4);
        assert!(detect(&mut robots, &ground(), &params).is_empty());
    }

    #[test]
    fn collisions_carry_the_parameters_in_effect() {
        let mut robots = vec![ball(0, DVec3::new(0.0, 0.0, 0.45))];
        let params = ContactParameters::default()
            .with_friction(0.3)
            .with_restitution(0.2);
        let collisions = detect(&mut robots, &ground(), &params);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].parameters, params);
    }

    #[test]
    fn collisions_are_ordered_by_robot() {
        let mut robots = vec![
            ball(0, DVec3::new(3.0, 0.0, 0.45)),
            ball(1, DVec3::new(0.0, 0.0, 0.45)),
            ball(2, DVec3::new(0.9, 0.0, 0.45)),
        ];
        let collisions = detect(&mut robots, &ground(), &ContactParameters::default());
        let edges: Vec<_> = collisions.iter().filter_map(Collision::edge).collect();
        assert_eq!(edges, vec![(0, 0), (1, 2), (1, 1), (2, 2)]);
    }

    #[test]
    fn self_collision_skips_adjacent_bodies() {
        let mut def = RobotDefinition::new("folded");
        let shape = || CollisionShapeDefinition::new(Shape::sphere(0.3));
        def.add_body(RigidBodyDefinition::new("a", MassProperties::solid_sphere(1.0, 0.3)).with_shape(shape()))
            .add_body(RigidBodyDefinition::new("b", MassProperties::solid_sphere(1.0, 0.3)).with_shape(shape()))
            .add_body(RigidBodyDefinition::new("c", MassProperties::solid_sphere(1.0, 0.3)).with_shape(shape()));
        let chain = [
            ("j1", "root", "a", DVec3::new(0.0, 0.0, 2.0)),
            ("j2", "a", "b", DVec3::new(0.2, 0.0, 0.0)),
            ("j3", "b", "c", DVec3::new(0.2, 0.0, 0.0)),
        ];
        for (name, parent, child, offset) in chain {
            def.add_joint(
                JointDefinition::new(
                    name,
                    parent,
                    child,
                    JointKindDefinition::Revolute(OneDofJointDefinition::new(DVec3::Z)),
                )
                .with_frame(Pose::from_position(offset)),
            );
        }

        let robot = Robot::from_definition(&def, 0).unwrap();
        let mut robots = vec![robot.clone()];
        assert!(detect(&mut robots, &[], &ContactParameters::default()).is_empty());

        let mut robots = vec![Robot::from_definition(&def.clone().with_self_collision(true), 0).unwrap()];
        let collisions = detect(&mut robots, &[], &ContactParameters::default());
        // Only a and c are neither identical nor parent and child.
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].owner_a, CollidableOwner::Robot { robot: 0, body: 1 });
        assert_eq!(collisions[0].owner_b, CollidableOwner::Robot { robot: 0, body: 3 });
    }
}
