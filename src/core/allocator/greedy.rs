//! Greedy fair allocator
//!
//! Keeps one [`FairnessQueue`] per size class. A request walks the classes
//! from the largest one that fits the budget downward, taking the
//! least-allocated entries of each class first. Larger content first
//! maximizes bytes served per session; the per-class queues spread selection
//! across every entry that fits a class.

use crate::allocator::SpaceAllocator;
use crate::error::{AllocError, Result};
use crate::queue::{ContentEntry, FairnessQueue};
use crate::size_class::SizeClasses;
use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug)]
struct GreedyState {
    /// One queue per size class, indexed like the class table
    queues: Vec<FairnessQueue>,
    /// Class each tracked id was placed in
    class_of: AHashMap<String, usize>,
}

/// Exact per-request allocator
#[derive(Debug)]
pub struct GreedyAllocator {
    classes: SizeClasses,
    state: Mutex<GreedyState>,
}

/// Entry counts per size class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GreedyStats {
    pub entries: usize,
    pub per_class: Vec<usize>,
}

impl GreedyAllocator {
    /// Create an allocator over the given class table
    pub fn new(classes: SizeClasses) -> Self {
        let queues = (0..classes.len()).map(|_| FairnessQueue::new()).collect();

        GreedyAllocator {
            classes,
            state: Mutex::new(GreedyState {
                queues,
                class_of: AHashMap::new(),
            }),
        }
    }

    pub fn size_classes(&self) -> &SizeClasses {
        &self.classes
    }

    /// How many times `id` has been selected
    pub fn allocation_count(&self, id: &str) -> Option<u64> {
        let state = self.state.lock();
        let class = *state.class_of.get(id)?;
        state.queues[class].allocations(id)
    }

    pub fn stats(&self) -> GreedyStats {
        let state = self.state.lock();
        GreedyStats {
            entries: state.class_of.len(),
            per_class: state.queues.iter().map(FairnessQueue::len).collect(),
        }
    }
}

impl SpaceAllocator for GreedyAllocator {
    fn register(&self, id: &str, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.class_of.contains_key(id) {
            return Err(AllocError::DuplicateEntry(id.to_string()));
        }

        let class = self.classes.class_of(size);
        state.queues[class].push(ContentEntry::new(id, size));
        state.class_of.insert(id.to_string(), class);

        debug!("Registered {} ({} bytes) in class {}", id, size, class);
        Ok(())
    }

    fn unregister(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock();
        let class = state
            .class_of
            .remove(id)
            .ok_or_else(|| AllocError::NotFound(id.to_string()))?;
        state.queues[class].remove(id)?;

        debug!("Unregistered {} from class {}", id, class);
        Ok(())
    }

    fn allocate(&self, available: u64) -> Vec<String> {
        let mut state = self.state.lock();
        let mut remaining = available;
        let mut chosen = Vec::new();
        let mut class = self.classes.highest_within(remaining);

        while class != 0 && remaining > 0 {
            // Entries of this class are larger than the class below's
            // threshold, so none fits once the budget drops under it
            let lower = self.classes.threshold(class - 1);
            let queue = &mut state.queues[class];
            let mut considered = Vec::new();

            while remaining >= lower {
                let Some(mut entry) = queue.pop_min() else {
                    break;
                };
                if entry.size > remaining {
                    considered.push(entry);
                    break;
                }

                remaining -= entry.size;
                entry.allocations += 1;
                chosen.push(entry.id.clone());
                considered.push(entry);
            }

            for entry in considered {
                queue.push(entry);
            }

            // Skip classes the remaining budget can no longer reach
            class = (class - 1).min(self.classes.highest_within(remaining));
        }

        debug!(
            "Allocated {} entries ({} of {} bytes)",
            chosen.len(),
            available - remaining,
            available
        );
        chosen
    }

    fn len(&self) -> usize {
        self.state.lock().class_of.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> GreedyAllocator {
        GreedyAllocator::new(SizeClasses::new([4096, 1024, 65549, 328748]))
    }

    #[test]
    fn test_largest_class_first() {
        let alloc = allocator();
        alloc.register("cid1", 786).unwrap();
        alloc.register("cid2", 3997).unwrap();
        alloc.register("cid3", 78112).unwrap();

        assert_eq!(alloc.allocate(7600), vec!["cid2", "cid1"]);
        assert_eq!(alloc.allocation_count("cid1"), Some(1));
        assert_eq!(alloc.allocation_count("cid2"), Some(1));
        assert_eq!(alloc.allocation_count("cid3"), Some(0));
    }

    #[test]
    fn test_duplicate_register() {
        let alloc = allocator();
        alloc.register("a", 10).unwrap();
        assert!(matches!(
            alloc.register("a", 20),
            Err(AllocError::DuplicateEntry(id)) if id == "a"
        ));
        assert_eq!(alloc.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let alloc = allocator();
        alloc.register("a", 2000).unwrap();
        alloc.unregister("a").unwrap();

        assert!(alloc.is_empty());
        assert!(matches!(alloc.unregister("a"), Err(AllocError::NotFound(_))));
        assert!(alloc.allocate(1 << 20).is_empty());

        // Re-registering after a purge starts from a fresh counter
        alloc.register("a", 2000).unwrap();
        assert_eq!(alloc.allocation_count("a"), Some(0));
    }

    #[test]
    fn test_budget_below_smallest_class() {
        let alloc = allocator();
        alloc.register("tiny", 10).unwrap();
        assert!(alloc.allocate(1023).is_empty());
        assert_eq!(alloc.allocate(1024), vec!["tiny"]);
    }

    #[test]
    fn test_zero_size_content_never_served() {
        let alloc = allocator();
        alloc.register("empty", 0).unwrap();
        assert_eq!(alloc.stats().per_class[0], 1);
        assert!(alloc.allocate(u64::MAX).is_empty());
    }

    #[test]
    fn test_oversized_content_respects_budget() {
        let alloc = GreedyAllocator::new(SizeClasses::new([1024]));
        alloc.register("huge", 5000).unwrap();

        assert!(alloc.allocate(2000).is_empty());
        assert_eq!(alloc.allocate(6000), vec!["huge"]);
    }

    #[test]
    fn test_skips_unreachable_classes() {
        let alloc = allocator();
        alloc.register("big", 64_000).unwrap();
        alloc.register("mid", 4000).unwrap();
        alloc.register("small", 1000).unwrap();

        // After taking "big" only 1549 remain: class 3 steps straight to 1
        assert_eq!(alloc.allocate(65549), vec!["big", "small"]);
        assert_eq!(alloc.allocate(70_000), vec!["big", "mid", "small"]);
    }

    #[test]
    fn test_fills_class_down_to_lower_threshold() {
        let alloc = GreedyAllocator::new(SizeClasses::new([1024, 4096]));
        alloc.register("x", 3000).unwrap();
        alloc.register("y", 3000).unwrap();

        // 4000 bytes remain after "x", still above class 2's lower bound
        let mut ids = alloc.allocate(7000);
        ids.sort();
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[test]
    fn test_entry_that_no_longer_fits_stays_queued() {
        let alloc = GreedyAllocator::new(SizeClasses::new([1024, 4096]));
        alloc.register("x", 3000).unwrap();
        alloc.register("y", 3000).unwrap();
        alloc.register("small", 500).unwrap();

        // 2000 left after the first pick: the second 3000-byte entry goes
        // back untouched and the walk moves on to class 1
        let ids = alloc.allocate(5000);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[1], "small");
        let picked = alloc.allocation_count("x").unwrap() + alloc.allocation_count("y").unwrap();
        assert_eq!(picked, 1);
    }

    #[test]
    fn test_rotation_within_class() {
        let alloc = allocator();
        for i in 0..3 {
            alloc.register(&format!("c{}", i), 3000).unwrap();
        }

        for _ in 0..300 {
            let picked = alloc.allocate(8192);
            assert_eq!(picked.len(), 2);
        }

        let counts: Vec<u64> = (0..3)
            .map(|i| alloc.allocation_count(&format!("c{}", i)).unwrap())
            .collect();
        assert_eq!(counts.iter().sum::<u64>(), 600);
        let spread = counts.iter().max().unwrap() - counts.iter().min().unwrap();
        assert!(spread <= 1, "uneven counters: {:?}", counts);
    }

    #[test]
    fn test_stats() {
        let alloc = allocator();
        alloc.register("a", 500).unwrap();
        alloc.register("b", 900).unwrap();
        alloc.register("c", 70_000).unwrap();

        let stats = alloc.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.per_class, vec![0, 2, 0, 0, 1]);
    }
}
