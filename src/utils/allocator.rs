use std::marker::PhantomData;

/// Handle into a [`TickArena`], stamped with the epoch it was issued in.
///
/// Handles from a previous tick never resolve after the arena is cleared.
pub struct TickHandle<T> {
    index: u32,
    epoch: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TickHandle<T> {
    fn new(index: usize, epoch: u32) -> Self {
        Self {
            index: index as u32,
            epoch,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

impl<T> Clone for TickHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TickHandle<T> {}

impl<T> PartialEq for TickHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.epoch == other.epoch
    }
}

impl<T> Eq for TickHandle<T> {}

impl<T> PartialOrd for TickHandle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for TickHandle<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.epoch, self.index).cmp(&(other.epoch, other.index))
    }
}

impl<T> std::hash::Hash for TickHandle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.epoch.hash(state);
    }
}

impl<T> std::fmt::Debug for TickHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TickHandle({}@{})", self.index, self.epoch)
    }
}

/// Scratch storage cleared at the start of every tick.
///
/// Storage is kept between ticks; only the contents and the epoch change.
#[derive(Debug)]
pub struct TickArena<T> {
    items: Vec<T>,
    epoch: u32,
}

impl<T> Default for TickArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TickArena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            epoch: 0,
        }
    }

    /// Drops every item and invalidates all outstanding handles.
    pub fn clear(&mut self) {
        self.items.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn insert(&mut self, item: T) -> TickHandle<T> {
        let index = self.items.len();
        self.items.push(item);
        TickHandle::new(index, self.epoch)
    }

    pub fn get(&self, handle: TickHandle<T>) -> Option<&T> {
        if handle.epoch == self.epoch {
            self.items.get(handle.index())
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: TickHandle<T>) -> Option<&mut T> {
        if handle.epoch == self.epoch {
            self.items.get_mut(handle.index())
        } else {
            None
        }
    }

    pub fn handles(&self) -> impl Iterator<Item = TickHandle<T>> + '_ {
        (0..self.items.len()).map(|index| TickHandle::new(index, self.epoch))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TickHandle<T>, &T)> + '_ {
        self.items
            .iter()
            .enumerate()
            .map(|(index, item)| (TickHandle::new(index, self.epoch), item))
    }

    pub fn values(&self) -> &[T] {
        &self.items
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

impl<T> std::ops::Index<TickHandle<T>> for TickArena<T> {
    type Output = T;

    fn index(&self, handle: TickHandle<T>) -> &T {
        match self.get(handle) {
            Some(item) => item,
            None => panic!("stale {handle:?} used in epoch {}", self.epoch),
        }
    }
}
