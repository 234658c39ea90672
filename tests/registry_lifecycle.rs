//! Location lifecycle through the public registry API

use cdn_alloc::{
    AllocError, Allocator, AllocatorConfig, RegistryBuilder, SpaceAllocator, StaticRankingSource,
    Strategy,
};
use std::sync::Arc;

#[test]
fn test_greedy_example_allocation() {
    let config =
        AllocatorConfig::from_toml_str("size_classes = [4096, 1024, 65549, 328748]").unwrap();
    let registry = RegistryBuilder::new().config(config).build().unwrap();

    registry.new_entry("eu", "cid1", 786).unwrap();
    registry.new_entry("eu", "cid2", 3997).unwrap();
    registry.new_entry("eu", "cid3", 78112).unwrap();

    assert_eq!(
        registry.allocate_space("eu", 7600).unwrap(),
        vec!["cid2", "cid1"]
    );
}

#[test]
fn test_one_allocator_per_location() {
    let registry = RegistryBuilder::new().build().unwrap();

    registry.new_entry("eu", "a", 10).unwrap();
    let first = registry.allocator("eu").unwrap();
    registry.new_entry("eu", "b", 10).unwrap();
    let second = registry.allocator("eu").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(matches!(*first, Allocator::Greedy(_)));
    assert_eq!(first.len(), 2);
}

#[test]
fn test_location_recreated_after_teardown() {
    let registry = RegistryBuilder::new().build().unwrap();

    registry.new_entry("eu", "a", 2000).unwrap();
    for _ in 0..5 {
        registry.allocate_space("eu", 4096).unwrap();
    }
    let old = registry.allocator("eu").unwrap();
    registry.del_entry("eu", "a").unwrap();

    assert!(registry.allocator("eu").is_none());
    assert!(matches!(
        registry.allocate_space("eu", 4096),
        Err(AllocError::UnknownLocation(_))
    ));

    registry.new_entry("eu", "a", 2000).unwrap();
    let new = registry.allocator("eu").unwrap();
    assert!(!Arc::ptr_eq(&old, &new));

    // Fresh allocator, fresh counters
    match &*new {
        Allocator::Greedy(greedy) => assert_eq!(greedy.allocation_count("a"), Some(0)),
        Allocator::Precomputed(_) => panic!("expected greedy allocator"),
    }
}

#[test]
fn test_errors_surface_to_caller() {
    let registry = RegistryBuilder::new().build().unwrap();
    registry.new_entry("eu", "a", 10).unwrap();

    assert!(matches!(
        registry.new_entry("eu", "a", 10),
        Err(AllocError::DuplicateEntry(id)) if id == "a"
    ));
    assert!(matches!(
        registry.del_entry("eu", "zzz"),
        Err(AllocError::NotFound(id)) if id == "zzz"
    ));
    assert!(matches!(
        registry.del_entry("us", "a"),
        Err(AllocError::UnknownLocation(loc)) if loc == "us"
    ));
    assert_eq!(registry.live_entries("eu"), 1);
}

#[test]
fn test_empty_result_is_not_an_error() {
    let registry = RegistryBuilder::new().build().unwrap();
    registry.new_entry("eu", "big", 10 * 1024 * 1024).unwrap();

    assert_eq!(registry.allocate_space("eu", 512).unwrap(), Vec::<String>::new());
}

#[test]
fn test_precomputed_requires_ranking_source() {
    let mut config = AllocatorConfig::default();
    config.strategy = Strategy::Precomputed;

    assert!(matches!(
        RegistryBuilder::new().config(config.clone()).build(),
        Err(AllocError::InvalidConfig(_))
    ));
    assert!(RegistryBuilder::new()
        .config(config)
        .ranking_source(Arc::new(StaticRankingSource::new()))
        .without_background_refresh()
        .build()
        .is_ok());
}

#[test]
fn test_recompute_all_skips_greedy() {
    let registry = RegistryBuilder::new().build().unwrap();
    registry.new_entry("eu", "a", 10).unwrap();
    registry.new_entry("us", "b", 10).unwrap();

    assert_eq!(registry.recompute_all().unwrap(), 0);
}
