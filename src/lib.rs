//! # cdn-alloc - Space-Aware Content Allocation
//!
//! `cdn-alloc` decides which content an edge server should fetch and serve
//! given how many bytes it has free. Content is registered per network
//! location; each location gets its own allocator, created on first use and
//! destroyed with its last entry.
//!
//! Two strategies sit behind [`SpaceAllocator`]:
//!
//! - **Greedy**: walks size classes from the largest that fits downward,
//!   taking the least-allocated content of each class first. Exact and
//!   stateless between calls apart from its fairness counters.
//! - **Precomputed**: periodically pulls a priority ranking from upstream and
//!   solves a fixed menu of budgets in the background; requests look up the
//!   nearest solution and top it off. Registrations become visible after the
//!   next cycle.
//!
//! ## Quick Start
//!
//! ```rust
//! use cdn_alloc::{AllocatorConfig, RegistryBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let config = AllocatorConfig::from_toml_str("size_classes = [1024, 4096, 65549]")?;
//! let registry = RegistryBuilder::new().config(config).build()?;
//!
//! registry.new_entry("eu-west", "cid1", 786)?;
//! registry.new_entry("eu-west", "cid2", 3997)?;
//!
//! let ids = registry.allocate_space("eu-west", 7600)?;
//! assert_eq!(ids, vec!["cid2", "cid1"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Precomputed Strategy
//!
//! ```rust
//! use cdn_alloc::{AllocatorConfig, RegistryBuilder, StaticRankingSource, Strategy, Result};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let ranking = Arc::new(StaticRankingSource::new());
//! ranking.set_priority("default", "hot", 100);
//!
//! let mut config = AllocatorConfig::default();
//! config.strategy = Strategy::Precomputed;
//!
//! let registry = RegistryBuilder::new()
//!     .config(config)
//!     .ranking_source(ranking)
//!     .without_background_refresh()
//!     .build()?;
//!
//! registry.new_entry("eu-west", "hot", 4096)?;
//! assert!(registry.allocate_space("eu-west", 1 << 30)?.is_empty());
//!
//! registry.recompute_all()?;
//! assert_eq!(registry.allocate_space("eu-west", 1 << 30)?, vec!["hot"]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use crate::core::{allocator, loader, queue, ranking, registry, size_class};

pub use crate::config::{AllocatorConfig, PrecomputedConfig, Strategy};
pub use crate::core::{
    allocator::{
        greedy::{GreedyAllocator, GreedyStats},
        precomputed::{PrecomputedAllocator, Snapshot, Solution},
        Allocator, SpaceAllocator,
    },
    loader::{load_network_state, JsonNetworkState, LoadReport, NetworkStateReader},
    queue::{ContentEntry, FairnessQueue},
    ranking::{JsonFileRankingSource, Ranking, RankingSource, StaticRankingSource},
    registry::LocationRegistry,
    size_class::SizeClasses,
};
pub use crate::error::{AllocError, Result};

use std::sync::Arc;
use tracing::{debug, info};

/// Builder for a configured [`LocationRegistry`]
///
/// The configured strategy decides which [`Allocator`] variant every new
/// location gets. The precomputed strategy needs a ranking source.
pub struct RegistryBuilder {
    config: AllocatorConfig,
    ranking: Option<Arc<dyn RankingSource>>,
    background_refresh: bool,
}

impl RegistryBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        RegistryBuilder {
            config: AllocatorConfig::default(),
            ranking: None,
            background_refresh: true,
        }
    }

    /// Use the given configuration
    pub fn config(mut self, config: AllocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the upstream ranking source (precomputed strategy)
    pub fn ranking_source(mut self, source: Arc<dyn RankingSource>) -> Self {
        self.ranking = Some(source);
        self
    }

    /// Don't spawn recompute workers; cycles only run through
    /// [`LocationRegistry::recompute_all`] or [`Allocator::recompute_now`]
    pub fn without_background_refresh(mut self) -> Self {
        self.background_refresh = false;
        self
    }

    /// Build the registry
    pub fn build(self) -> Result<LocationRegistry<Allocator>> {
        self.config.check()?;
        info!("Building registry with {:?} strategy", self.config.strategy);

        match self.config.strategy {
            Strategy::Greedy => {
                let classes = self.config.size_classes();
                Ok(LocationRegistry::new(move |location| {
                    debug!("New greedy allocator for '{}'", location);
                    Ok(Allocator::Greedy(GreedyAllocator::new(classes.clone())))
                }))
            }
            Strategy::Precomputed => {
                let source = self.ranking.ok_or_else(|| {
                    AllocError::InvalidConfig(
                        "precomputed strategy requires a ranking source".to_string(),
                    )
                })?;
                let budgets = self.config.budgets();
                let ranking_key = self.config.precomputed.ranking_key.clone();
                let interval = self.config.recompute_interval();
                let background_refresh = self.background_refresh;

                Ok(LocationRegistry::new(move |location| {
                    debug!("New precomputed allocator for '{}'", location);
                    let mut allocator = PrecomputedAllocator::new(
                        budgets.clone(),
                        Arc::clone(&source),
                        ranking_key.clone(),
                    );
                    if background_refresh {
                        allocator.start(interval)?;
                    }
                    Ok(Allocator::Precomputed(allocator))
                }))
            }
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
