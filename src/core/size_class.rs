//! Size-class index
//!
//! An ascending table of byte thresholds used to bucket content by size and
//! to pick the starting class for an available-space budget. The first
//! threshold is always 0, an unbounded "small" bucket that is never served.

/// Index of the smallest threshold `>= value`
///
/// Returns `sorted.len()` (one past the end) when every threshold is
/// smaller than `value`. On an exact match the matching index is returned.
pub fn ceil_index(sorted: &[u64], value: u64) -> usize {
    sorted.partition_point(|&t| t < value)
}

/// Index of the largest threshold `<= value`
///
/// Returns `None` when every threshold is larger than `value`. With
/// duplicate thresholds the last matching index is returned.
pub fn floor_index(sorted: &[u64], value: u64) -> Option<usize> {
    sorted.partition_point(|&t| t <= value).checked_sub(1)
}

/// Immutable table of size-class thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeClasses {
    thresholds: Vec<u64>,
}

impl SizeClasses {
    /// Build a table from arbitrary thresholds
    ///
    /// The thresholds are sorted and deduplicated, and 0 is inserted if
    /// missing.
    pub fn new<I: IntoIterator<Item = u64>>(thresholds: I) -> Self {
        let mut thresholds: Vec<u64> = thresholds.into_iter().collect();
        thresholds.push(0);
        thresholds.sort_unstable();
        thresholds.dedup();

        SizeClasses { thresholds }
    }

    /// Number of classes, including the zero class
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// Whether the table holds no classes
    ///
    /// A table built by [`SizeClasses::new`] always holds the zero class, so
    /// this returns false for every constructed table.
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn thresholds(&self) -> &[u64] {
        &self.thresholds
    }

    /// Upper byte bound of `class`
    ///
    /// # Panics
    ///
    /// Panics if `class >= self.len()`.
    pub fn threshold(&self, class: usize) -> u64 {
        self.thresholds[class]
    }

    /// Class a content entry of `size` bytes belongs to
    ///
    /// Ceiling match, clamped so that content larger than the largest
    /// threshold lands in the largest class.
    pub fn class_of(&self, size: u64) -> usize {
        ceil_index(&self.thresholds, size).min(self.thresholds.len() - 1)
    }

    /// Highest class whose threshold fits within `budget`
    ///
    /// Never fails because the zero class fits every budget.
    pub fn highest_within(&self, budget: u64) -> usize {
        floor_index(&self.thresholds, budget).unwrap_or(0)
    }
}
