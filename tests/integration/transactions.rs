//! Write and read transaction scopes.
//!
//! These tests verify:
//! - a write transaction coalesces its changes into one notification
//! - there is no rollback; partial progress stays applied
//! - open transactions keep conflicting writers out until they time out
//! - observer failures raised by `end` are reported to the caller

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use devtree::{
    DataElementOptions, ModelError, ObserverError, Tree, TreeAction, TreeEvent, TreeOptions,
};

fn counting_observer(count: &Arc<AtomicUsize>) -> Arc<dyn devtree::TreeObserver> {
    let count = Arc::clone(count);
    Arc::new(move |event: &TreeEvent| -> Result<(), ObserverError> {
        assert_eq!(event.action, TreeAction::TreeChanged);
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn short_timeout_tree() -> Arc<Tree> {
    Arc::new(
        Tree::with_options(TreeOptions::new().lock_timeout(Duration::from_millis(50)))
            .expect("tree"),
    )
}

#[test]
fn batch_raises_a_single_tree_changed() -> devtree::Result<()> {
    let tree = Tree::new();
    let root = tree.root();
    let notifications = Arc::new(AtomicUsize::new(0));
    tree.subscribe(root, counting_observer(&notifications))?;

    let mut tx = tree.begin_write()?;
    let hvac = tx.create_structure_element(Some(root), "hvac")?;
    let fan = tx.create_data_element(Some(hvac), "fan", DataElementOptions::writable())?;
    let shortcuts = tx.create_structure_element(Some(root), "shortcuts")?;
    tx.add_link(shortcuts, fan, None)?;
    tx.remove_link_by_identifier(shortcuts, "FAN")?;
    tx.add_link(shortcuts, fan, Some("speed"))?;
    assert_eq!(tx.operations(), 6);
    tx.end()?;

    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(tree.get_element_by_address("/shortcuts/speed"), Some(fan));
    Ok(())
}

#[test]
fn dropping_an_open_transaction_ends_it() -> devtree::Result<()> {
    let tree = Tree::new();
    let root = tree.root();
    let notifications = Arc::new(AtomicUsize::new(0));
    tree.subscribe(root, counting_observer(&notifications))?;
    {
        let mut tx = tree.begin_write()?;
        tx.create_structure_element(Some(root), "a")?;
        assert!(tree.lock_snapshot().writer);
    }
    assert!(!tree.lock_snapshot().writer);
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert!(tree.begin_write().is_ok());
    Ok(())
}

#[test]
fn failed_operation_keeps_earlier_changes() -> devtree::Result<()> {
    let tree = Tree::new();
    let root = tree.root();
    let mut tx = tree.begin_write()?;
    let a = tx.create_structure_element(Some(root), "a")?;
    let b = tx.create_structure_element(Some(a), "b")?;
    let err = tx.add_link(b, a, None).unwrap_err();
    assert!(matches!(err, ModelError::BadRequest(_)));
    assert_eq!(tx.operations(), 2);
    tx.end()?;

    assert_eq!(tree.get_element_by_address("/a/b"), Some(b));
    assert!(tree.links(b)?.is_empty());
    Ok(())
}

#[test]
fn open_write_transaction_times_out_other_writers() {
    let tree = short_timeout_tree();
    let tx = tree.begin_write().expect("write");

    let contender = Arc::clone(&tree);
    let result = thread::spawn(move || {
        let started = Instant::now();
        let err = contender
            .create_structure_element(Some(contender.root()), "late")
            .unwrap_err();
        (err, started.elapsed())
    })
    .join()
    .expect("contender thread");

    assert!(matches!(result.0, ModelError::Locked { .. }), "{}", result.0);
    assert!(result.1 >= Duration::from_millis(40));
    drop(tx);
    assert_eq!(tree.get_element_by_address("/late"), None);
}

#[test]
fn read_transaction_blocks_writers_but_not_readers() {
    let tree = short_timeout_tree();
    let a = tree
        .create_structure_element(Some(tree.root()), "a")
        .expect("create");
    let read = tree.begin_read().expect("read");

    let other = Arc::clone(&tree);
    let (write_err, second_read, lookup) = thread::spawn(move || {
        let write_err = other.begin_write().err();
        let second_read = other.begin_read().map(|_| ()).is_ok();
        (write_err, second_read, other.get_element_by_address("/a"))
    })
    .join()
    .expect("reader thread");

    assert!(matches!(write_err, Some(ModelError::Locked { .. })));
    assert!(second_read);
    assert_eq!(lookup, Some(a));
    assert_eq!(tree.lock_snapshot().readers, 1);
    drop(read);
    assert_eq!(tree.lock_snapshot().readers, 0);
}

#[test]
fn end_reports_observer_failures() -> devtree::Result<()> {
    let tree = Tree::new();
    let root = tree.root();
    tree.subscribe(
        root,
        Arc::new(|_: &TreeEvent| -> Result<(), ObserverError> { Err("display offline".into()) }),
    )?;

    let mut tx = tree.begin_write()?;
    let a = tx.create_structure_element(Some(root), "a")?;
    let err = tx.end().unwrap_err();
    match err {
        ModelError::Notification(notification) => {
            assert_eq!(notification.failures.len(), 1);
            assert_eq!(notification.failures[0].node, root);
            assert!(notification.failures[0].message.contains("display offline"));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(!tx.is_active());
    assert_eq!(tree.parent(a)?, Some(root));
    Ok(())
}

#[test]
fn read_transaction_end_is_idempotent() -> devtree::Result<()> {
    let tree = Tree::new();
    let mut read = tree.begin_read()?;
    assert!(read.is_active());
    assert_eq!(read.tree().root(), tree.root());
    read.end();
    read.end();
    assert!(!read.is_active());
    assert!(tree.begin_write().is_ok());
    Ok(())
}
