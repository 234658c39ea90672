//! Location-scoped allocator registry
//!
//! Owns one allocator per location. A location's allocator is created on its
//! first registration and destroyed once its last entry is removed.
//!
//! The registry lock only guards the location map. Calls into an allocator
//! run after the lock is released; each allocator serializes itself. Every
//! slot counts live entries plus registrations in flight, so a concurrent
//! removal cannot destroy an allocator that is about to gain an entry.

use crate::allocator::{Allocator, SpaceAllocator};
use crate::error::{AllocError, Result};
use ahash::AHashMap;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds the allocator for a newly seen location
pub type AllocatorFactory<A> = Box<dyn Fn(&str) -> Result<A> + Send + Sync>;

struct Slot<A> {
    allocator: Arc<A>,
    live: usize,
}

/// Per-location allocator map with reference-counted lifecycle
pub struct LocationRegistry<A: SpaceAllocator> {
    factory: AllocatorFactory<A>,
    locations: Mutex<AHashMap<String, Slot<A>>>,
}

impl<A: SpaceAllocator> LocationRegistry<A> {
    /// Create an empty registry
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Result<A> + Send + Sync + 'static,
    {
        LocationRegistry {
            factory: Box::new(factory),
            locations: Mutex::new(AHashMap::new()),
        }
    }

    /// Register content at a location, creating its allocator if needed
    pub fn new_entry(&self, location: &str, id: &str, size: u64) -> Result<()> {
        let allocator = {
            let mut locations = self.locations.lock();
            let slot = match locations.entry(location.to_string()) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(vacant) => {
                    let allocator = (self.factory)(location)?;
                    info!("Created allocator for location '{}'", location);
                    vacant.insert(Slot {
                        allocator: Arc::new(allocator),
                        live: 0,
                    })
                }
            };
            slot.live += 1;
            Arc::clone(&slot.allocator)
        };

        if let Err(e) = allocator.register(id, size) {
            self.release(location, &allocator);
            return Err(e);
        }

        debug!("New entry {} at '{}'", id, location);
        Ok(())
    }

    /// Remove content from a location
    ///
    /// Destroys the location's allocator when this was its last entry.
    pub fn del_entry(&self, location: &str, id: &str) -> Result<()> {
        let allocator = self.get(location)?;
        allocator.unregister(id)?;
        self.release(location, &allocator);

        debug!("Deleted entry {} at '{}'", id, location);
        Ok(())
    }

    /// Content ids a server at `location` should fetch with `available` bytes
    pub fn allocate_space(&self, location: &str, available: u64) -> Result<Vec<String>> {
        Ok(self.get(location)?.allocate(available))
    }

    /// The live allocator for a location, if any
    pub fn allocator(&self, location: &str) -> Option<Arc<A>> {
        self.locations
            .lock()
            .get(location)
            .map(|slot| Arc::clone(&slot.allocator))
    }

    /// Locations with a live allocator, sorted
    pub fn locations(&self) -> Vec<String> {
        let mut locations: Vec<String> = self.locations.lock().keys().cloned().collect();
        locations.sort();
        locations
    }

    /// Live entry count of a location (0 if unknown)
    pub fn live_entries(&self, location: &str) -> usize {
        self.locations
            .lock()
            .get(location)
            .map_or(0, |slot| slot.live)
    }

    /// Number of live locations
    pub fn len(&self) -> usize {
        self.locations.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.lock().is_empty()
    }

    fn get(&self, location: &str) -> Result<Arc<A>> {
        self.allocator(location)
            .ok_or_else(|| AllocError::UnknownLocation(location.to_string()))
    }

    /// Drop one live reference, destroying the slot at zero
    fn release(&self, location: &str, allocator: &Arc<A>) {
        let mut locations = self.locations.lock();
        let emptied = match locations.get_mut(location) {
            Some(slot) if Arc::ptr_eq(&slot.allocator, allocator) => {
                slot.live -= 1;
                slot.live == 0
            }
            _ => false,
        };

        if emptied {
            locations.remove(location);
            info!("Destroyed allocator for location '{}'", location);
        }
    }
}

impl LocationRegistry<Allocator> {
    /// Run a precompute cycle for every live location
    ///
    /// Stops at the first failed cycle. Returns the number of locations
    /// whose allocator published a new snapshot.
    pub fn recompute_all(&self) -> Result<usize> {
        let allocators: Vec<Arc<Allocator>> = self
            .locations
            .lock()
            .values()
            .map(|slot| Arc::clone(&slot.allocator))
            .collect();

        let mut published = 0;
        for allocator in allocators {
            if allocator.recompute_now()?.is_some() {
                published += 1;
            }
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::greedy::GreedyAllocator;
    use crate::size_class::SizeClasses;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> LocationRegistry<GreedyAllocator> {
        LocationRegistry::new(|_| Ok(GreedyAllocator::new(SizeClasses::new([1024, 4096]))))
    }

    #[test]
    fn test_lazy_creation() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let registry = LocationRegistry::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(GreedyAllocator::new(SizeClasses::new([1024])))
        });

        assert!(registry.is_empty());
        registry.new_entry("eu", "a", 100).unwrap();
        registry.new_entry("eu", "b", 100).unwrap();
        registry.new_entry("us", "a", 100).unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(registry.locations(), vec!["eu", "us"]);
        assert_eq!(registry.live_entries("eu"), 2);
    }

    #[test]
    fn test_last_removal_destroys_location() {
        let registry = registry();
        registry.new_entry("eu", "a", 100).unwrap();
        registry.new_entry("eu", "b", 100).unwrap();

        registry.del_entry("eu", "a").unwrap();
        assert_eq!(registry.allocate_space("eu", 4096).unwrap(), vec!["b"]);

        registry.del_entry("eu", "b").unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.allocate_space("eu", 4096),
            Err(AllocError::UnknownLocation(loc)) if loc == "eu"
        ));
        assert!(matches!(
            registry.del_entry("eu", "b"),
            Err(AllocError::UnknownLocation(_))
        ));
    }

    #[test]
    fn test_failed_register_keeps_count() {
        let registry = registry();
        registry.new_entry("eu", "a", 100).unwrap();
        assert!(matches!(
            registry.new_entry("eu", "a", 100),
            Err(AllocError::DuplicateEntry(_))
        ));
        assert_eq!(registry.live_entries("eu"), 1);

        assert!(matches!(
            registry.del_entry("eu", "missing"),
            Err(AllocError::NotFound(_))
        ));
        assert_eq!(registry.live_entries("eu"), 1);
    }

    #[test]
    fn test_factory_error_creates_nothing() {
        let registry: LocationRegistry<GreedyAllocator> = LocationRegistry::new(|loc| {
            Err(AllocError::InvalidConfig(format!("no allocator for {}", loc)))
        });

        assert!(matches!(
            registry.new_entry("eu", "a", 1),
            Err(AllocError::InvalidConfig(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_locations_are_isolated() {
        let registry = registry();
        registry.new_entry("eu", "a", 1000).unwrap();
        registry.new_entry("us", "b", 1000).unwrap();

        assert_eq!(registry.allocate_space("eu", 4096).unwrap(), vec!["a"]);
        assert_eq!(registry.allocate_space("us", 4096).unwrap(), vec!["b"]);
    }
}
