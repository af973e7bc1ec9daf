/// Robots coupled by at least one collision this tick, solved together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionGroup {
    /// Robot indices, ascending.
    pub robots: Vec<usize>,
    /// Indices into the tick's collision list, ascending.
    pub collisions: Vec<usize>,
}

/// Result of partitioning robots by collision connectivity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Groups ordered by their smallest robot index.
    pub groups: Vec<CollisionGroup>,
    /// Robots involved in no collision, ascending.
    pub uncovered: Vec<usize>,
}

impl Partition {
    pub fn group_of(&self, robot: usize) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.robots.binary_search(&robot).is_ok())
    }
}

/// Builds collision groups each tick.
///
/// An edge `(a, b)` per collision links the robots on both sides; terrain and
/// self collisions are self edges `(a, a)` so the robot still forms a group.
#[derive(Debug, Default)]
pub struct IslandManager {
    adjacency: Vec<Vec<usize>>,
    partition: Partition,
}

impl IslandManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_groups(&mut self, robot_count: usize, edges: &[(usize, usize)]) -> &Partition {
        self.adjacency.iter_mut().for_each(Vec::clear);
        self.adjacency.resize_with(robot_count, Vec::new);
        self.partition.groups.clear();
        self.partition.uncovered.clear();

        for &(a, b) in edges {
            self.adjacency[a].push(b);
            self.adjacency[b].push(a);
        }

        let mut visited = vec![false; robot_count];
        let mut group_of = vec![usize::MAX; robot_count];
        for robot in 0..robot_count {
            if visited[robot] {
                continue;
            }
            if self.adjacency[robot].is_empty() {
                visited[robot] = true;
                self.partition.uncovered.push(robot);
                continue;
            }
            let mut robots = self.depth_first_collect(robot, &mut visited);
            robots.sort_unstable();
            let group = self.partition.groups.len();
            for &r in &robots {
                group_of[r] = group;
            }
            self.partition.groups.push(CollisionGroup {
                robots,
                collisions: Vec::new(),
            });
        }

        for (collision, &(a, _)) in edges.iter().enumerate() {
            self.partition.groups[group_of[a]].collisions.push(collision);
        }

        &self.partition
    }

    fn depth_first_collect(&self, start: usize, visited: &mut [bool]) -> Vec<usize> {
        let mut stack = vec![start];
        let mut result = Vec::new();

        while let Some(node) = stack.pop() {
            if !visited[node] {
                visited[node] = true;
                result.push(node);
                stack.extend(self.adjacency[node].iter().copied());
            }
        }

        result
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }
}

/// Partitions `robot_count` robots into collision groups from per-collision edges.
pub fn partition(robot_count: usize, edges: &[(usize, usize)]) -> Partition {
    let mut manager = IslandManager::new();
    manager.build_groups(robot_count, edges);
    manager.partition
}
