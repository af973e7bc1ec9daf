use std::cmp::Ordering;

use super::contact::CollidableId;
use crate::core::collider::Aabb;

/// Sort-and-sweep broad phase along the world X axis.
///
/// Scratch buffers are kept between ticks; the candidate list is rebuilt
/// from nothing on every call.
#[derive(Debug, Default)]
pub struct BroadPhase {
    entries: Vec<(CollidableId, Aabb)>,
    active: Vec<usize>,
    pairs: Vec<(CollidableId, CollidableId)>,
}

impl BroadPhase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.active.clear();
        self.pairs.clear();
    }

    pub fn insert(&mut self, id: CollidableId, aabb: Aabb) {
        self.entries.push((id, aabb));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlapping pairs accepted by `accept`, each as `(lower id, higher id)`,
    /// sorted ascending.
    pub fn get_potential_pairs<F>(&mut self, mut accept: F) -> &[(CollidableId, CollidableId)]
    where
        F: FnMut(CollidableId, CollidableId) -> bool,
    {
        self.pairs.clear();
        self.active.clear();
        self.entries.sort_by(|(id_a, a), (id_b, b)| {
            a.min
                .x
                .total_cmp(&b.min.x)
                .then_with(|| id_a.cmp(id_b))
        });

        for current in 0..self.entries.len() {
            let (id, aabb) = self.entries[current];
            let entries = &self.entries;
            self.active
                .retain(|&other| entries[other].1.max.x >= aabb.min.x);

            for &other in &self.active {
                let (other_id, other_aabb) = entries[other];
                if !other_aabb.overlaps(&aabb) {
                    continue;
                }
                let pair = match other_id.cmp(&id) {
                    Ordering::Less => (other_id, id),
                    _ => (id, other_id),
                };
                if accept(pair.0, pair.1) {
                    self.pairs.push(pair);
                }
            }
            self.active.push(current);
        }

        self.pairs.sort_unstable();
        &self.pairs
    }
}
