//! Priority ranking sources
//!
//! The precomputed allocator pulls an `id -> priority` ranking from an
//! upstream coordinator on every recompute cycle. Higher priority content is
//! packed into the precomputed solutions first.

use crate::error::{AllocError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Content id -> priority score
pub type Ranking = HashMap<String, i64>;

/// Upstream source of priority rankings
pub trait RankingSource: Send + Sync {
    /// Fetch the ranking stored under `key`
    ///
    /// Failures are reported as `UpstreamFetch`.
    fn fetch(&self, key: &str) -> Result<Ranking>;
}

/// In-memory rankings, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticRankingSource {
    rankings: RwLock<HashMap<String, Ranking>>,
}

impl StaticRankingSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the ranking stored under `key`
    pub fn set<S: Into<String>>(&self, key: S, ranking: Ranking) {
        self.rankings.write().insert(key.into(), ranking);
    }

    /// Set a single priority under `key`
    pub fn set_priority(&self, key: &str, id: &str, priority: i64) {
        self.rankings
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string(), priority);
    }
}

impl RankingSource for StaticRankingSource {
    fn fetch(&self, key: &str) -> Result<Ranking> {
        Ok(self.rankings.read().get(key).cloned().unwrap_or_default())
    }
}

/// Rankings read from a JSON document of the form `{ key: { id: priority } }`
///
/// The file is re-read on every fetch so an external publisher can replace
/// it between cycles. A key missing from the document yields an empty
/// ranking.
#[derive(Debug, Clone)]
pub struct JsonFileRankingSource {
    path: PathBuf,
}

impl JsonFileRankingSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileRankingSource {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RankingSource for JsonFileRankingSource {
    fn fetch(&self, key: &str) -> Result<Ranking> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            AllocError::UpstreamFetch(format!("reading {:?}: {}", self.path, e))
        })?;
        let mut rankings: HashMap<String, Ranking> = serde_json::from_str(&raw).map_err(|e| {
            AllocError::UpstreamFetch(format!("decoding {:?}: {}", self.path, e))
        })?;

        Ok(rankings.remove(key).unwrap_or_default())
    }
}
