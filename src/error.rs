//! Error types for allocation operations

use thiserror::Error;

/// Allocation result type
pub type Result<T> = std::result::Result<T, AllocError>;

/// Allocation errors
///
/// An empty allocation is not an error: a budget with no eligible content
/// yields `Ok(vec![])`.
#[derive(Error, Debug)]
pub enum AllocError {
    /// Content id is already tracked by this allocator
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Content id is not tracked by this allocator
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// No live allocator exists for the location
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    /// Priority ranking fetch failed
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    /// Network state could not be read
    #[error("State read failed: {0}")]
    StateRead(String),

    /// Network state replay found an entry that is already registered
    #[error("Consistency error: {id} already registered at location {location}")]
    Consistency { location: String, id: String },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decoding error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}
