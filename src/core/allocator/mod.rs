//! Content allocation strategies
//!
//! Two strategies answer "which content should a server with N free bytes
//! fetch?":
//! - [`greedy::GreedyAllocator`]: exact, recomputes fairness state per call
//! - [`precomputed::PrecomputedAllocator`]: amortizes work across calls by
//!   solving a fixed menu of budgets in the background

pub mod greedy;
pub mod precomputed;

use crate::error::Result;

/// Space allocator trait
///
/// Implementations carry their own locking; every method takes `&self` so a
/// single instance can be shared across request threads.
pub trait SpaceAllocator: Send + Sync {
    /// Track a content entry of `size` bytes
    ///
    /// Fails with `DuplicateEntry` if the id is already tracked.
    fn register(&self, id: &str, size: u64) -> Result<()>;

    /// Stop tracking a content entry
    ///
    /// Fails with `NotFound` if the id is not tracked.
    fn unregister(&self, id: &str) -> Result<()>;

    /// Content ids to serve with `available` free bytes
    ///
    /// An empty list means nothing eligible fits.
    fn allocate(&self, available: u64) -> Vec<String>;

    /// Number of tracked entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The strategy selected by configuration
#[derive(Debug)]
pub enum Allocator {
    Greedy(greedy::GreedyAllocator),
    Precomputed(precomputed::PrecomputedAllocator),
}

impl Allocator {
    /// Run a precompute cycle now
    ///
    /// Returns the published generation, or `None` for the greedy strategy
    /// which has nothing to precompute.
    pub fn recompute_now(&self) -> Result<Option<u64>> {
        match self {
            Allocator::Greedy(_) => Ok(None),
            Allocator::Precomputed(a) => a.recompute_now().map(Some),
        }
    }
}

impl SpaceAllocator for Allocator {
    fn register(&self, id: &str, size: u64) -> Result<()> {
        match self {
            Allocator::Greedy(a) => a.register(id, size),
            Allocator::Precomputed(a) => a.register(id, size),
        }
    }

    fn unregister(&self, id: &str) -> Result<()> {
        match self {
            Allocator::Greedy(a) => a.unregister(id),
            Allocator::Precomputed(a) => a.unregister(id),
        }
    }

    fn allocate(&self, available: u64) -> Vec<String> {
        match self {
            Allocator::Greedy(a) => a.allocate(available),
            Allocator::Precomputed(a) => a.allocate(available),
        }
    }

    fn len(&self) -> usize {
        match self {
            Allocator::Greedy(a) => a.len(),
            Allocator::Precomputed(a) => a.len(),
        }
    }
}

impl From<greedy::GreedyAllocator> for Allocator {
    fn from(allocator: greedy::GreedyAllocator) -> Self {
        Allocator::Greedy(allocator)
    }
}

impl From<precomputed::PrecomputedAllocator> for Allocator {
    fn from(allocator: precomputed::PrecomputedAllocator) -> Self {
        Allocator::Precomputed(allocator)
    }
}
