//! Network-state loader
//!
//! Replays "what content is served where" from durable state into a
//! [`LocationRegistry`] at startup. A clean boot never registers the same
//! entry twice, so hitting `DuplicateEntry` means the registry and the
//! durable state disagree and the load fails with a consistency error.

use crate::allocator::SpaceAllocator;
use crate::error::{AllocError, Result};
use crate::registry::LocationRegistry;
use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, error, info};

/// Read access to durable network state
pub trait NetworkStateReader {
    /// Every known server
    fn list_servers(&self) -> Result<Vec<String>>;

    /// Content ids currently served by a server
    fn list_server_content(&self, server: &str) -> Result<Vec<String>>;

    /// Size in bytes of a content id
    fn content_size(&self, content: &str) -> Result<u64>;

    /// Stable logical identifier of a content id
    fn functional_id(&self, content: &str) -> Result<String>;

    /// Location a server belongs to
    fn server_location(&self, server: &str) -> Result<String>;
}

/// Summary of one load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub servers: usize,
    pub entries: usize,
    pub locations: usize,
}

/// Register every served content entry with the registry
///
/// Content served by several servers of one location is registered once.
pub fn load_network_state<R, A>(reader: &R, registry: &LocationRegistry<A>) -> Result<LoadReport>
where
    R: NetworkStateReader + ?Sized,
    A: SpaceAllocator,
{
    let servers = reader.list_servers()?;
    let mut resolved: AHashMap<String, (String, u64)> = AHashMap::new();
    let mut seen: AHashSet<(String, String)> = AHashSet::new();
    let mut locations: AHashSet<String> = AHashSet::new();
    let mut report = LoadReport {
        servers: servers.len(),
        ..Default::default()
    };

    for server in &servers {
        let location = reader.server_location(server)?;
        let content = reader.list_server_content(server)?;
        debug!(
            "Server {} at '{}' serves {} entries",
            server,
            location,
            content.len()
        );

        for content_id in content {
            let (functional_id, size) = match resolved.get(&content_id) {
                Some(known) => known.clone(),
                None => {
                    let known = (
                        reader.functional_id(&content_id)?,
                        reader.content_size(&content_id)?,
                    );
                    resolved.insert(content_id.clone(), known.clone());
                    known
                }
            };

            if !seen.insert((location.clone(), functional_id.clone())) {
                continue;
            }

            match registry.new_entry(&location, &functional_id, size) {
                Ok(()) => {
                    report.entries += 1;
                    locations.insert(location.clone());
                }
                Err(AllocError::DuplicateEntry(id)) => {
                    error!(
                        "Entry {} already registered at '{}' while loading network state",
                        id, location
                    );
                    return Err(AllocError::Consistency { location, id });
                }
                Err(e) => return Err(e),
            }
        }
    }

    report.locations = locations.len();
    info!(
        "Loaded {} entries across {} locations from {} servers",
        report.entries, report.locations, report.servers
    );
    Ok(report)
}

/// One server in a [`JsonNetworkState`] document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    pub location: String,
    #[serde(default)]
    pub content: Vec<String>,
}

/// One content item in a [`JsonNetworkState`] document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentState {
    pub size: u64,
    /// Defaults to the content id
    #[serde(default)]
    pub functional_id: Option<String>,
}

/// Network state held in a JSON document
///
/// ```json
/// {
///   "servers": { "edge-1": { "location": "eu", "content": ["c1"] } },
///   "content": { "c1": { "size": 4096, "functional_id": "movie-1" } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonNetworkState {
    #[serde(default)]
    pub servers: BTreeMap<String, ServerState>,
    #[serde(default)]
    pub content: BTreeMap<String, ContentState>,
}

impl JsonNetworkState {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn server(&self, server: &str) -> Result<&ServerState> {
        self.servers
            .get(server)
            .ok_or_else(|| AllocError::StateRead(format!("unknown server {}", server)))
    }

    fn item(&self, content: &str) -> Result<&ContentState> {
        self.content
            .get(content)
            .ok_or_else(|| AllocError::StateRead(format!("unknown content {}", content)))
    }
}

impl NetworkStateReader for JsonNetworkState {
    fn list_servers(&self) -> Result<Vec<String>> {
        Ok(self.servers.keys().cloned().collect())
    }

    fn list_server_content(&self, server: &str) -> Result<Vec<String>> {
        Ok(self.server(server)?.content.clone())
    }

    fn content_size(&self, content: &str) -> Result<u64> {
        Ok(self.item(content)?.size)
    }

    fn functional_id(&self, content: &str) -> Result<String> {
        Ok(self
            .item(content)?
            .functional_id
            .clone()
            .unwrap_or_else(|| content.to_string()))
    }

    fn server_location(&self, server: &str) -> Result<String> {
        Ok(self.server(server)?.location.clone())
    }
}
