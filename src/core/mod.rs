//! Allocation engine core
//!
//! - [`size_class`] - threshold table and floor/ceiling search
//! - [`queue`] - fairness priority queue with removal by id
//! - [`allocator`] - greedy and precomputed allocation strategies
//! - [`registry`] - per-location allocators with reference-counted lifecycle
//! - [`ranking`] - upstream priority ranking sources
//! - [`loader`] - startup replay of network state into a registry

pub mod allocator;
pub mod loader;
pub mod queue;
pub mod ranking;
pub mod registry;
pub mod size_class;
