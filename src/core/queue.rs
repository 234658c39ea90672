//! Fairness priority queue
//!
//! Array-backed binary min-heap of content entries ordered by allocation
//! count, with an id -> heap position index so that any entry can be removed
//! in O(log n). Every swap updates the index; only `push`, `pop_min` and
//! `remove` mutate the heap, so the index cannot drift from the heap.
//!
//! Not thread-safe on its own: the owning allocator serializes access.

use crate::error::{AllocError, Result};
use ahash::AHashMap;

/// A unit of content eligible for allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Content id, unique per allocator
    pub id: String,
    /// Size in bytes
    pub size: u64,
    /// Number of times this entry has been selected
    pub allocations: u64,
}

impl ContentEntry {
    /// Fresh entry with a zero allocation count
    pub fn new<S: Into<String>>(id: S, size: u64) -> Self {
        ContentEntry {
            id: id.into(),
            size,
            allocations: 0,
        }
    }
}

/// Min-heap keyed by allocation count with removal by id
#[derive(Debug, Default)]
pub struct FairnessQueue {
    heap: Vec<ContentEntry>,
    positions: AHashMap<String, usize>,
}

impl FairnessQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Allocation count of a queued entry
    pub fn allocations(&self, id: &str) -> Option<u64> {
        self.positions.get(id).map(|&pos| self.heap[pos].allocations)
    }

    /// Least-allocated entry without removing it
    pub fn peek_min(&self) -> Option<&ContentEntry> {
        self.heap.first()
    }

    /// Insert an entry, replacing any queued entry with the same id
    pub fn push(&mut self, entry: ContentEntry) {
        if let Some(&pos) = self.positions.get(&entry.id) {
            self.heap[pos] = entry;
            let pos = self.sift_up(pos);
            self.sift_down(pos);
            return;
        }

        let pos = self.heap.len();
        self.positions.insert(entry.id.clone(), pos);
        self.heap.push(entry);
        self.sift_up(pos);
    }

    /// Remove and return the entry with the smallest allocation count
    ///
    /// Ties are broken arbitrarily. An empty queue yields `None`.
    pub fn pop_min(&mut self) -> Option<ContentEntry> {
        if self.heap.is_empty() {
            return None;
        }

        let last = self.heap.len() - 1;
        self.swap(0, last);
        let entry = self.heap.pop()?;
        self.positions.remove(&entry.id);

        if !self.heap.is_empty() {
            self.sift_down(0);
        }

        Some(entry)
    }

    /// Remove the entry with the given id
    ///
    /// The entry is treated as having the minimum possible priority, floated
    /// to the root and popped.
    pub fn remove(&mut self, id: &str) -> Result<ContentEntry> {
        let pos = *self
            .positions
            .get(id)
            .ok_or_else(|| AllocError::NotFound(id.to_string()))?;

        self.float_to_root(pos);
        self.pop_min()
            .ok_or_else(|| AllocError::NotFound(id.to_string()))
    }

    fn float_to_root(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_up(&mut self, mut pos: usize) -> usize {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].allocations >= self.heap[parent].allocations {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
        pos
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;

            if left < len && self.heap[left].allocations < self.heap[smallest].allocations {
                smallest = left;
            }
            if right < len && self.heap[right].allocations < self.heap[smallest].allocations {
                smallest = right;
            }
            if smallest == pos {
                break;
            }

            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        for pos in [a, b] {
            if let Some(slot) = self.positions.get_mut(&self.heap[pos].id) {
                *slot = pos;
            }
        }
    }

    #[cfg(test)]
    fn index_is_consistent(&self) -> bool {
        self.positions.len() == self.heap.len()
            && self
                .heap
                .iter()
                .enumerate()
                .all(|(pos, e)| self.positions.get(&e.id) == Some(&pos))
    }
}
