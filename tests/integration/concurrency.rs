//! Multi-threaded access to one shared tree.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use devtree::{ModelError, Tree};

const THREADS: usize = 8;

#[test]
fn racing_creates_of_one_identifier_admit_exactly_one() {
    let tree = Arc::new(Tree::new());
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let tree = Arc::clone(&tree);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // mixed case on purpose
                let name = if i % 2 == 0 { "Sensor" } else { "SENSOR" };
                tree.create_structure_element(Some(tree.root()), name)
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("worker"))
        .collect();
    let created = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|err| matches!(err, ModelError::AlreadyExists(_))));
    assert_eq!(tree.children(tree.root()).unwrap().len(), 1);
    assert_eq!(tree.len(), 2);
}

#[test]
fn parallel_writers_build_disjoint_subtrees() {
    let tree = Arc::new(Tree::new());
    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || -> devtree::Result<()> {
                let zone = tree.create_structure_element(Some(tree.root()), &format!("zone{i}"))?;
                for j in 0..25 {
                    tree.create_structure_element(Some(zone), &format!("device{j}"))?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker").expect("build");
    }

    assert_eq!(tree.len(), 1 + THREADS * 26);
    for i in 0..THREADS {
        let address = format!("/zone{i}/device24");
        let node = tree.get_element_by_address(&address).expect("resolves");
        assert_eq!(
            tree.address(node).unwrap(),
            format!("device/zone{i}/device24")
        );
    }
    let report = tree.verify().unwrap();
    assert!(report.success, "{:?}", report.findings);
}

#[test]
fn readers_keep_resolving_while_links_churn() {
    let tree = Arc::new(Tree::new());
    let root = tree.root();
    let stable = tree.create_structure_element(Some(root), "stable").unwrap();
    let leaf = tree.create_structure_element(Some(stable), "leaf").unwrap();
    let aliases = tree.create_structure_element(Some(root), "aliases").unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let lookups = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            let stop = Arc::clone(&stop);
            let lookups = Arc::clone(&lookups);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    assert_eq!(tree.get_element_by_address("/stable/leaf"), Some(leaf));
                    if let Some(found) = tree.get_element_by_address("/aliases/shortcut") {
                        assert_eq!(found, leaf);
                    }
                    lookups.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for _ in 0..500 {
        tree.add_link(aliases, leaf, Some("shortcut")).unwrap();
        tree.remove_link(aliases, leaf).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().expect("reader");
    }
    assert!(lookups.load(Ordering::Relaxed) > 0);
    assert!(tree.links(aliases).unwrap().is_empty());
    assert!(tree.verify().unwrap().success);
}

#[test]
fn concurrent_moves_never_create_a_cycle() {
    let tree = Arc::new(Tree::new());
    let root = tree.root();
    let nodes: Vec<_> = (0..6)
        .map(|i| {
            tree.create_structure_element(Some(root), &format!("n{i}"))
                .unwrap()
        })
        .collect();
    let nodes = Arc::new(nodes);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let tree = Arc::clone(&tree);
            let nodes = Arc::clone(&nodes);
            thread::spawn(move || {
                for step in 0..200 {
                    let a = nodes[(t + step) % nodes.len()];
                    let b = nodes[(t * 3 + step * 7 + 1) % nodes.len()];
                    if let Ok(Some(parent)) = tree.parent(a) {
                        if tree.remove_element(parent, a).is_ok()
                            && tree.add_element(b, a).is_err()
                        {
                            let _ = tree.add_element(tree.root(), a);
                        }
                    }
                    let _ = tree.add_link(a, b, None);
                    let _ = tree.remove_link(a, b);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("mover");
    }

    let report = tree.verify().unwrap();
    assert!(
        !report.findings.iter().any(|f| f.message.contains("cycle")),
        "{:?}",
        report.findings
    );
    assert!(report.success, "{:?}", report.findings);
}
