//! Address cache behaviour observed through the public API and metrics.

#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;

use devtree::{CounterMetrics, Tree, TreeOptions};

fn tree_with_metrics(options: TreeOptions) -> (Tree, Arc<CounterMetrics>) {
    let metrics = Arc::new(CounterMetrics::default());
    let tree = Tree::with_options(options.metrics(metrics.clone())).expect("tree");
    (tree, metrics)
}

#[test]
fn equivalent_spellings_share_one_entry() {
    let (tree, metrics) = tree_with_metrics(TreeOptions::new());
    let hall = tree
        .create_structure_element(Some(tree.root()), "Hall")
        .unwrap();

    assert_eq!(tree.get_element_by_address("/hall"), Some(hall));
    assert_eq!(tree.get_element_by_address("DEVICE/HALL"), Some(hall));
    assert_eq!(tree.get_element_by_address("device//Hall/"), Some(hall));
    assert_eq!(tree.cache().len(), 1);
    assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 2);
}

#[test]
fn failed_lookups_are_not_cached() {
    let (tree, metrics) = tree_with_metrics(TreeOptions::new());
    assert_eq!(tree.get_element_by_address("/missing"), None);
    assert_eq!(tree.get_element_by_address("/missing"), None);
    assert!(tree.cache().is_empty());
    assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 2);

    let missing = tree
        .create_structure_element(Some(tree.root()), "missing")
        .unwrap();
    assert_eq!(tree.get_element_by_address("/missing"), Some(missing));
}

#[test]
fn capacity_bounds_the_cache() {
    let (tree, _) = tree_with_metrics(TreeOptions::new().cache_capacity(8));
    let root = tree.root();
    for i in 0..32 {
        tree.create_structure_element(Some(root), &format!("n{i}"))
            .unwrap();
    }
    for i in 0..32 {
        assert!(tree.get_element_by_address(&format!("/n{i}")).is_some());
    }
    assert!(tree.cache().len() <= 8);
    assert_eq!(tree.cache().capacity(), 8);
}

#[test]
fn disabled_cache_always_walks() {
    let (tree, metrics) = tree_with_metrics(TreeOptions::new().cache_enabled(false));
    let hall = tree
        .create_structure_element(Some(tree.root()), "hall")
        .unwrap();
    for _ in 0..3 {
        assert_eq!(tree.get_element_by_address("/hall"), Some(hall));
    }
    assert_eq!(metrics.cache_hits.load(Ordering::Relaxed), 0);
    assert_eq!(metrics.cache_misses.load(Ordering::Relaxed), 3);
    assert!(!tree.cache().is_enabled());
}

#[test]
fn no_stale_resolution_survives_a_change() {
    let (tree, _) = tree_with_metrics(TreeOptions::new());
    let root = tree.root();
    let a = tree.create_structure_element(Some(root), "a").unwrap();
    let b = tree.create_structure_element(Some(root), "b").unwrap();
    let leaf = tree.create_structure_element(Some(a), "leaf").unwrap();
    assert_eq!(tree.get_element_by_address("/a/leaf"), Some(leaf));

    tree.remove_element(a, leaf).unwrap();
    assert_eq!(tree.get_element_by_address("/a/leaf"), None);
    tree.add_element(b, leaf).unwrap();
    assert_eq!(tree.get_element_by_address("/b/leaf"), Some(leaf));
    assert_eq!(tree.get_element_by_address("/a/leaf"), None);

    tree.remove_element(b, leaf).unwrap();
    tree.discard_element(leaf).unwrap();
    assert_eq!(tree.get_element_by_address("/b/leaf"), None);
}

#[test]
fn writes_inside_a_transaction_invalidate_immediately() {
    let (tree, metrics) = tree_with_metrics(TreeOptions::new());
    let root = tree.root();
    let a = tree.create_structure_element(Some(root), "a").unwrap();
    assert_eq!(tree.get_element_by_address("/a"), Some(a));
    let before = metrics.cache_invalidations.load(Ordering::Relaxed);

    let mut tx = tree.begin_write().unwrap();
    tx.remove_element(root, a).unwrap();
    assert_eq!(tx.tree().get_element_by_address("/a"), None);
    tx.end().unwrap();
    assert!(metrics.cache_invalidations.load(Ordering::Relaxed) > before);
}

#[test]
fn inspection_handle_never_changes_resolution() {
    let (tree, _) = tree_with_metrics(TreeOptions::new());
    let hall = tree
        .create_structure_element(Some(tree.root()), "hall")
        .unwrap();
    assert_eq!(tree.get_element_by_address("/hall"), Some(hall));

    let cache = tree.cache();
    assert!(cache.is_enabled());
    assert_eq!(cache.len(), 1);
    assert!(cache.capacity() >= cache.len());

    // reads through the handle leave both lookups intact
    assert!(!cache.is_empty());
    assert_eq!(tree.get_element_by_address("/ghost"), None);
    assert_eq!(tree.get_element_by_address("/hall"), Some(hall));

    tree.remove_element(tree.root(), hall).unwrap();
    assert!(tree.cache().is_empty());
    assert_eq!(tree.get_element_by_address("/hall"), None);
}
