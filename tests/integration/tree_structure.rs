//! End-to-end structural scenarios against the public API.
//!
//! Builds small device models and checks that addresses, reference pairs and
//! notifications stay consistent across creates, moves, links and discards.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use devtree::{
    DataElementOptions, ElementKind, ModelError, NodeId, ObserverError, ReferenceKind, Tree,
    TreeAction, TreeEvent, TreeObserver,
};

/// Observer that records every action it sees.
#[derive(Default)]
struct ActionLog {
    actions: Mutex<Vec<(TreeAction, NodeId)>>,
}

impl TreeObserver for ActionLog {
    fn on_tree_changed(&self, event: &TreeEvent) -> Result<(), ObserverError> {
        self.actions.lock().unwrap().push((event.action, event.source));
        Ok(())
    }
}

struct Thermostat {
    tree: Tree,
    rooms: NodeId,
    kitchen: NodeId,
    setpoint: NodeId,
    favourites: NodeId,
}

fn thermostat() -> devtree::Result<Thermostat> {
    let tree = Tree::new();
    let root = tree.root();
    let rooms = tree.create_structure_element(Some(root), "Rooms")?;
    let kitchen = tree.create_structure_element(Some(rooms), "Kitchen")?;
    let setpoint =
        tree.create_data_element(Some(kitchen), "Setpoint", DataElementOptions::writable())?;
    let favourites = tree.create_structure_element(Some(root), "Favourites")?;
    tree.add_link(favourites, setpoint, Some("kitchen-setpoint"))?;
    Ok(Thermostat {
        tree,
        rooms,
        kitchen,
        setpoint,
        favourites,
    })
}

#[test]
fn canonical_and_alias_addresses_resolve_to_the_same_node() -> devtree::Result<()> {
    let t = thermostat()?;
    assert_eq!(t.tree.address(t.setpoint)?, "device/Rooms/Kitchen/Setpoint");
    assert_eq!(
        t.tree.get_element_by_address("/rooms/kitchen/setpoint"),
        Some(t.setpoint)
    );
    assert_eq!(
        t.tree.get_element_by_address("device/favourites/KITCHEN-SETPOINT"),
        Some(t.setpoint)
    );
    assert_eq!(
        t.tree
            .get_element_by_address("/favourites/kitchen-setpoint/setdata")
            .and_then(|id| t.tree.address(id).ok()),
        Some("device/Rooms/Kitchen/Setpoint/setdata".to_string())
    );
    Ok(())
}

#[test]
fn every_forward_reference_has_a_matching_inverse() -> devtree::Result<()> {
    let t = thermostat()?;
    let mut ids = vec![t.tree.root()];
    ids.extend(t.tree.descendants(t.tree.root())?);
    for id in ids {
        for reference in t.tree.forward_references(id)? {
            let inverse = t.tree.inverse_references(reference.target())?;
            assert!(
                inverse.contains(&reference.inverse()),
                "{id} -> {} has no inverse",
                reference.target()
            );
        }
    }
    let report = t.tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    Ok(())
}

#[test]
fn snapshot_reflects_children_and_links() -> devtree::Result<()> {
    let t = thermostat()?;
    let favourites = t.tree.node(t.favourites).expect("snapshot");
    assert_eq!(favourites.kind, ElementKind::Structure);
    assert_eq!(favourites.children().count(), 0);
    let links: Vec<_> = favourites.links().collect();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].kind(), ReferenceKind::Link);
    assert_eq!(links[0].target(), t.setpoint);

    let setpoint = t.tree.node(t.setpoint).expect("snapshot");
    assert_eq!(setpoint.parent, Some(t.kitchen));
    assert_eq!(setpoint.inverse.len(), 2);
    Ok(())
}

#[test]
fn moving_a_room_keeps_links_valid() -> devtree::Result<()> {
    let t = thermostat()?;
    let root = t.tree.root();
    let floors = t.tree.create_structure_element(Some(root), "Floors")?;
    let ground = t.tree.create_structure_element(Some(floors), "Ground")?;

    // the kitchen subtree is linked into, so it cannot leave its parent yet
    let err = t.tree.remove_element(t.rooms, t.kitchen).unwrap_err();
    assert!(matches!(err, ModelError::BadRequest(_)));

    t.tree.remove_link(t.favourites, t.setpoint)?;
    t.tree.remove_element(t.rooms, t.kitchen)?;
    t.tree.add_element(ground, t.kitchen)?;
    t.tree.add_link(t.favourites, t.setpoint, Some("kitchen-setpoint"))?;

    assert_eq!(
        t.tree.address(t.setpoint)?,
        "device/Floors/Ground/Kitchen/Setpoint"
    );
    let getter = t
        .tree
        .get_element_by_address("/floors/ground/kitchen/setpoint/getdata")
        .expect("getdata moved with its data element");
    assert_eq!(
        t.tree.address(getter)?,
        "device/Floors/Ground/Kitchen/Setpoint/getdata"
    );
    assert_eq!(
        t.tree.get_element_by_address("/favourites/kitchen-setpoint"),
        Some(t.setpoint)
    );
    assert_eq!(t.tree.get_element_by_address("/rooms/kitchen"), None);
    assert!(t.tree.verify()?.success);
    Ok(())
}

#[test]
fn structural_observer_sees_subtree_changes() -> devtree::Result<()> {
    let t = thermostat()?;
    let log = Arc::new(ActionLog::default());
    let subscription = t.tree.subscribe(t.rooms, log.clone())?;

    let bedroom = t.tree.create_structure_element(Some(t.rooms), "Bedroom")?;
    t.tree.create_service_element(Some(bedroom), "Reset", None)?;
    t.tree.create_structure_element(Some(t.favourites), "Elsewhere")?;

    assert_eq!(
        *log.actions.lock().unwrap(),
        vec![(TreeAction::ChildAdded, t.rooms), (TreeAction::ChildAdded, bedroom)]
    );
    assert!(t.tree.unsubscribe(t.rooms, subscription));
    Ok(())
}

#[test]
fn panicking_observer_does_not_block_others() -> devtree::Result<()> {
    let tree = Tree::new();
    let root = tree.root();
    let delivered = Arc::new(AtomicUsize::new(0));
    tree.subscribe(
        root,
        Arc::new(|_: &TreeEvent| -> Result<(), ObserverError> { panic!("observer bug") }),
    )?;
    let counter = Arc::clone(&delivered);
    tree.subscribe(
        root,
        Arc::new(move |_: &TreeEvent| -> Result<(), ObserverError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )?;

    let lamp = tree.create_structure_element(Some(root), "lamp")?;
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(tree.parent(lamp)?, Some(root));

    let err = tree
        .raise_tree_changed(TreeEvent::new(TreeAction::TreeChanged, lamp))
        .unwrap_err();
    assert_eq!(err.failures.len(), 1);
    assert!(err.failures[0].message.contains("observer bug"));
    Ok(())
}

#[test]
fn detached_subtree_can_be_reattached_or_discarded() -> devtree::Result<()> {
    let tree = Tree::new();
    let root = tree.root();
    let module = tree.create_structure_element(None, "Module")?;
    let input = tree.create_data_element(Some(module), "Input", DataElementOptions::read_only())?;
    assert_eq!(tree.address(input)?, "Module/Input");
    assert_eq!(tree.get_element_by_address("/module"), None);

    tree.add_element(root, module)?;
    assert_eq!(tree.address(input)?, "device/Module/Input");
    assert!(tree.get_element_by_address("/module/input/getdata").is_some());

    tree.remove_element(root, module)?;
    let before = tree.len();
    let reclaimed = tree.discard_element(module)?;
    assert_eq!(reclaimed, 4);
    assert_eq!(tree.len(), before - 4);
    assert!(!tree.contains(input));
    Ok(())
}

#[test]
fn deep_chains_do_not_exhaust_the_stack() -> devtree::Result<()> {
    let tree = Tree::new();
    let top = tree.create_structure_element(None, "n0")?;
    let mut last = top;
    for depth in 1..5_000 {
        last = tree.create_structure_element(Some(last), &format!("n{depth}"))?;
    }
    tree.add_element(tree.root(), top)?;
    assert!(tree.address(last)?.starts_with("device/n0/n1/"));
    assert!(tree.address(last)?.ends_with("/n4999"));

    let err = tree.add_link(last, top, None).unwrap_err();
    assert!(matches!(err, ModelError::BadRequest(_)));
    assert!(tree.verify()?.success);
    Ok(())
}
