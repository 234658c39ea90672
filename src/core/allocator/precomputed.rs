//! Precomputed amortized allocator
//!
//! Registration only touches a live `id -> size` map. A recompute cycle
//! pulls a priority ranking from upstream, copies the live map and solves a
//! fixed menu of space budgets greedily by descending priority. The result
//! is published as one immutable [`Snapshot`]; `allocate` starts from the
//! nearest budget's solution and tops it off from a size-sorted list.
//!
//! Changes to the live map are invisible to `allocate` until the next cycle
//! publishes a snapshot (the staleness window). A deleted id can likewise
//! still be returned until then.
//!
//! ## Cost
//!
//! A cycle costs O(N log N + B * N) for N entries and B budgets. Spread over
//! R requests per cycle, lookups cost O(N) amortized when N / R <= 1 and
//! O(N log N / R + N) otherwise. The per-call fill is a linear walk of the
//! size-sorted list.

use crate::allocator::SpaceAllocator;
use crate::error::{AllocError, Result};
use crate::ranking::RankingSource;
use crate::size_class::{floor_index, SizeClasses};
use ahash::{AHashMap, AHashSet};
use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A feasible allocation for one budget
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    /// Chosen content ids, in selection order
    pub ids: Vec<String>,
    /// Exact bytes consumed by `ids`
    pub bytes: u64,
}

/// One published generation of precomputed state
#[derive(Debug, Default)]
pub struct Snapshot {
    /// Number of cycles published before this one
    pub generation: u64,
    /// One solution per budget, indexed like the budget table
    pub solutions: Vec<Solution>,
    /// Sizes of every known entry, ascending
    sizes: Vec<u64>,
    /// Ids parallel to `sizes`
    ids_by_size: Vec<String>,
}

impl Snapshot {
    fn empty(budgets: usize) -> Self {
        Snapshot {
            solutions: vec![Solution::default(); budgets],
            ..Default::default()
        }
    }

    /// Solve every budget against a copy of the live map
    fn build(
        generation: u64,
        budgets: &SizeClasses,
        entries: &AHashMap<String, u64>,
        ranking: &AHashMap<String, i64>,
    ) -> Self {
        // Descending priority, unranked content last, ties by id
        let mut by_priority: Vec<(&String, u64, i64)> = entries
            .iter()
            .map(|(id, &size)| (id, size, ranking.get(id).copied().unwrap_or(0)))
            .collect();
        by_priority.sort_unstable_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(b.0)));

        let solutions = budgets
            .thresholds()
            .iter()
            .map(|&budget| {
                let mut remaining = budget;
                let mut ids = Vec::new();
                for &(id, size, _) in &by_priority {
                    if remaining == 0 {
                        break;
                    }
                    if size <= remaining {
                        remaining -= size;
                        ids.push(id.clone());
                    }
                }
                Solution {
                    ids,
                    bytes: budget - remaining,
                }
            })
            .collect();

        let mut by_size: Vec<(u64, &String)> =
            entries.iter().map(|(id, &size)| (size, id)).collect();
        by_size.sort_unstable();

        Snapshot {
            generation,
            solutions,
            sizes: by_size.iter().map(|&(size, _)| size).collect(),
            ids_by_size: by_size.into_iter().map(|(_, id)| id.clone()).collect(),
        }
    }
}

struct Shared {
    budgets: SizeClasses,
    source: Arc<dyn RankingSource>,
    ranking_key: String,
    entries: Mutex<AHashMap<String, u64>>,
    snapshot: RwLock<Arc<Snapshot>>,
    /// Serializes cycles so generations publish in order
    cycle: Mutex<()>,
}

impl Shared {
    /// Run one fetch/compute/publish cycle, returning the new generation
    fn refresh(&self) -> Result<u64> {
        let _cycle = self.cycle.lock();

        // Request paths never wait on the upstream call
        let ranking: AHashMap<String, i64> =
            self.source.fetch(&self.ranking_key)?.into_iter().collect();
        let entries = self.entries.lock().clone();

        let generation = self.snapshot.read().generation + 1;
        let snapshot = Snapshot::build(generation, &self.budgets, &entries, &ranking);
        *self.snapshot.write() = Arc::new(snapshot);

        info!(
            "Published snapshot {} for '{}' ({} entries, {} ranked)",
            generation,
            self.ranking_key,
            entries.len(),
            ranking.len()
        );
        Ok(generation)
    }
}

/// Allocator serving lookups from periodically precomputed solutions
pub struct PrecomputedAllocator {
    shared: Arc<Shared>,
    /// Dropping the sender stops the background worker
    worker: Option<Sender<()>>,
}

impl PrecomputedAllocator {
    /// Create an allocator without a background worker
    ///
    /// `budgets` is the menu of space budgets to precompute; 0 is added if
    /// missing. `ranking_key` is passed to `source` on every cycle.
    pub fn new<S: Into<String>>(
        budgets: SizeClasses,
        source: Arc<dyn RankingSource>,
        ranking_key: S,
    ) -> Self {
        let snapshot = Snapshot::empty(budgets.len());
        PrecomputedAllocator {
            shared: Arc::new(Shared {
                budgets,
                source,
                ranking_key: ranking_key.into(),
                entries: Mutex::new(AHashMap::new()),
                snapshot: RwLock::new(Arc::new(snapshot)),
                cycle: Mutex::new(()),
            }),
            worker: None,
        }
    }

    /// Spawn the background recompute worker
    ///
    /// The worker runs one cycle per `interval` for as long as the allocator
    /// lives. A failed fetch skips the cycle and keeps the current snapshot.
    /// A cycle already in progress cannot be cancelled. Calling `start` on a
    /// running allocator is a no-op.
    pub fn start(&mut self, interval: Duration) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let ticker = channel::tick(interval);
        let shared = Arc::clone(&self.shared);

        thread::Builder::new()
            .name(format!("recompute-{}", self.shared.ranking_key))
            .spawn(move || loop {
                crossbeam::select! {
                    recv(shutdown_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if let Err(e) = shared.refresh() {
                            warn!("Skipping recompute for '{}': {}", shared.ranking_key, e);
                        }
                    }
                }
            })?;

        debug!(
            "Started recompute worker for '{}' every {:?}",
            self.shared.ranking_key, interval
        );
        self.worker = Some(shutdown_tx);
        Ok(())
    }

    /// Run one cycle on the calling thread
    ///
    /// Unlike the background worker, a failed fetch is returned to the
    /// caller. The previous snapshot stays published either way.
    pub fn recompute_now(&self) -> Result<u64> {
        self.shared.refresh()
    }

    /// Generation of the published snapshot (0 before the first cycle)
    pub fn generation(&self) -> u64 {
        self.shared.snapshot.read().generation
    }

    /// The currently published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.shared.snapshot.read())
    }

    pub fn budgets(&self) -> &SizeClasses {
        &self.shared.budgets
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl fmt::Debug for PrecomputedAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrecomputedAllocator")
            .field("budgets", &self.shared.budgets)
            .field("ranking_key", &self.shared.ranking_key)
            .field("entries", &self.len())
            .field("generation", &self.generation())
            .field("running", &self.is_running())
            .finish()
    }
}

impl SpaceAllocator for PrecomputedAllocator {
    fn register(&self, id: &str, size: u64) -> Result<()> {
        let mut entries = self.shared.entries.lock();
        if entries.contains_key(id) {
            return Err(AllocError::DuplicateEntry(id.to_string()));
        }
        entries.insert(id.to_string(), size);

        debug!("Registered {} ({} bytes), pending next cycle", id, size);
        Ok(())
    }

    fn unregister(&self, id: &str) -> Result<()> {
        self.shared
            .entries
            .lock()
            .remove(id)
            .ok_or_else(|| AllocError::NotFound(id.to_string()))?;

        debug!("Unregistered {}, pending next cycle", id);
        Ok(())
    }

    fn allocate(&self, available: u64) -> Vec<String> {
        let snapshot = self.snapshot();

        let budget = self.shared.budgets.highest_within(available);
        let solution = &snapshot.solutions[budget];
        let mut chosen = solution.ids.clone();
        let taken: AHashSet<&str> = solution.ids.iter().map(String::as_str).collect();
        let mut remaining = available - solution.bytes;

        // Top off with the largest unchosen entries that still fit
        if let Some(start) = floor_index(&snapshot.sizes, remaining) {
            for pos in (0..=start).rev() {
                if remaining == 0 {
                    break;
                }
                let size = snapshot.sizes[pos];
                let id = &snapshot.ids_by_size[pos];
                if size <= remaining && !taken.contains(id.as_str()) {
                    remaining -= size;
                    chosen.push(id.clone());
                }
            }
        }

        debug!(
            "Allocated {} entries ({} of {} bytes) from snapshot {}",
            chosen.len(),
            available - remaining,
            available,
            snapshot.generation
        );
        chosen
    }

    fn len(&self) -> usize {
        self.shared.entries.lock().len()
    }
}
