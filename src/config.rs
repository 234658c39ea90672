//! Allocator configuration
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid greedy configuration:
//!
//! ```toml
//! strategy = "precomputed"
//! size_classes = [1024, 4096, 65536]
//!
//! [precomputed]
//! budgets = [1048576, 16777216]
//! recompute_interval_ms = 30000
//! ranking_key = "popularity"
//! ```

use crate::error::{AllocError, Result};
use crate::size_class::SizeClasses;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

/// Which allocator each location gets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Exact per-request allocation
    #[default]
    Greedy,
    /// Background precomputation with on-demand top off
    Precomputed,
}

/// Settings for the precomputed strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PrecomputedConfig {
    /// Space budgets to precompute solutions for
    #[validate(length(min = 1))]
    pub budgets: Vec<u64>,

    /// Milliseconds between recompute cycles
    #[validate(range(min = 1))]
    pub recompute_interval_ms: u64,

    /// Key passed to the ranking source on every cycle
    #[validate(length(min = 1))]
    pub ranking_key: String,
}

impl Default for PrecomputedConfig {
    fn default() -> Self {
        PrecomputedConfig {
            budgets: vec![64 * MIB, 256 * MIB, GIB, 4 * GIB, 16 * GIB],
            recompute_interval_ms: 60_000,
            ranking_key: "default".to_string(),
        }
    }
}

/// Top-level allocator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AllocatorConfig {
    pub strategy: Strategy,

    /// Size-class thresholds in bytes (0 is implied)
    #[validate(length(min = 1))]
    pub size_classes: Vec<u64>,

    pub precomputed: PrecomputedConfig,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            strategy: Strategy::Greedy,
            size_classes: vec![KIB, 4 * KIB, 64 * KIB, MIB, 16 * MIB, 256 * MIB, GIB],
            precomputed: PrecomputedConfig::default(),
        }
    }
}

impl AllocatorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AllocatorConfig = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Validate this configuration and its strategy settings
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| AllocError::InvalidConfig(e.to_string()))?;
        if self.strategy == Strategy::Precomputed {
            self.precomputed
                .validate()
                .map_err(|e| AllocError::InvalidConfig(e.to_string()))?;
        }
        Ok(())
    }

    pub fn size_classes(&self) -> SizeClasses {
        SizeClasses::new(self.size_classes.iter().copied())
    }

    pub fn budgets(&self) -> SizeClasses {
        SizeClasses::new(self.precomputed.budgets.iter().copied())
    }

    pub fn recompute_interval(&self) -> Duration {
        Duration::from_millis(self.precomputed.recompute_interval_ms)
    }
}
