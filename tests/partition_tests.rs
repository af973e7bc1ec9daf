use impulse_dynamics::dynamics::{partition, IslandManager};

/// Small deterministic generator so the cases are reproducible.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 33) % bound as u64) as usize
    }
}

fn find(parent: &mut [usize], x: usize) -> usize {
    let mut root = x;
    while parent[root] != root {
        root = parent[root];
    }
    parent[x] = root;
    root
}

#[test]
fn groups_are_the_connected_components() {
    let mut rng = Lcg(7);
    for case in 0..200 {
        let robots = 1 + rng.next(12);
        let edge_count = rng.next(2 * robots);
        let edges: Vec<(usize, usize)> = (0..edge_count)
            .map(|_| (rng.next(robots), rng.next(robots)))
            .collect();

        let mut parent: Vec<usize> = (0..robots).collect();
        let mut touched = vec![false; robots];
        for &(a, b) in &edges {
            touched[a] = true;
            touched[b] = true;
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            parent[ra] = rb;
        }

        let result = partition(robots, &edges);

        // Every robot is in exactly one group or uncovered.
        let mut seen = vec![0; robots];
        for group in &result.groups {
            for &r in &group.robots {
                seen[r] += 1;
            }
        }
        for &r in &result.uncovered {
            seen[r] += 1;
            assert!(!touched[r], "case {case}: robot {r} has a collision");
        }
        assert!(seen.iter().all(|&n| n == 1), "case {case}: {seen:?}");

        for group in &result.groups {
            assert!(group.robots.windows(2).all(|w| w[0] < w[1]));
            let root = find(&mut parent, group.robots[0]);
            // Same component inside a group.
            for &r in &group.robots {
                assert_eq!(find(&mut parent, r), root, "case {case}");
            }
            // And the whole component.
            let size = (0..robots)
                .filter(|&r| touched[r] && find(&mut parent, r) == root)
                .count();
            assert_eq!(size, group.robots.len(), "case {case}");
            for &c in &group.collisions {
                assert!(group.robots.binary_search(&edges[c].0).is_ok());
                assert!(group.robots.binary_search(&edges[c].1).is_ok());
            }
        }

        let assigned: usize = result.groups.iter().map(|g| g.collisions.len()).sum();
        assert_eq!(assigned, edges.len());
        assert!(result
            .groups
            .windows(2)
            .all(|w| w[0].robots[0] < w[1].robots[0]));
    }
}

#[test]
fn manager_matches_the_pure_function() {
    let edges = [(0, 5), (2, 2), (5, 3), (6, 1)];
    let mut manager = IslandManager::new();
    manager.build_groups(8, &[(0, 1)]);
    assert_eq!(manager.build_groups(8, &edges), &partition(8, &edges));
}
