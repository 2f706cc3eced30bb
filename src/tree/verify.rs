use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use super::Tree;
use crate::address;
use crate::model::{Direction, NodeSnapshot, ReferenceKind};
use crate::types::{NodeId, Result};

const MAX_FINDINGS: usize = 32;

/// Represents a single structural problem discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// Node the problem was found on.
    pub node: NodeId,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Statistics collected during verification.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Nodes in the arena.
    pub nodes: u64,
    /// Child edges.
    pub child_edges: u64,
    /// Link edges.
    pub link_edges: u64,
    /// Nodes other than the root without a parent.
    pub detached_roots: u64,
}

/// Complete report of a verification pass.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether verification passed without finding any issues.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Whether findings were dropped because of the cap.
    pub truncated: bool,
    /// Statistics about the structure examined.
    pub counts: VerifyCounts,
}

struct Findings {
    items: Vec<VerifyFinding>,
    truncated: bool,
}

impl Findings {
    fn push(&mut self, node: NodeId, message: impl Into<String>) {
        if self.items.len() >= MAX_FINDINGS {
            self.truncated = true;
            return;
        }
        self.items.push(VerifyFinding {
            node,
            message: message.into(),
        });
    }
}

impl Tree {
    /// Checks every structural invariant over the whole arena.
    ///
    /// Holds the read lock for the duration so the view is consistent.
    ///
    /// # Errors
    /// * `ModelError::Locked` - the read lock was not acquired in time
    pub fn verify(&self) -> Result<VerifyReport> {
        let _read = self.acquire_reader()?;
        let snapshots: FxHashMap<NodeId, NodeSnapshot> = self
            .node_ids()
            .into_iter()
            .filter_map(|id| self.node(id).map(|snap| (id, snap)))
            .collect();

        let mut findings = Findings {
            items: Vec::new(),
            truncated: false,
        };
        let mut counts = VerifyCounts {
            nodes: snapshots.len() as u64,
            ..VerifyCounts::default()
        };

        let mut ids: Vec<&NodeId> = snapshots.keys().collect();
        ids.sort_unstable();
        for id in ids {
            let node = &snapshots[id];
            check_node(node, &snapshots, &mut findings, &mut counts);
        }
        check_root(self, &snapshots, &mut findings);
        check_acyclic(&snapshots, &mut findings);

        Ok(VerifyReport {
            success: findings.items.is_empty(),
            findings: findings.items,
            truncated: findings.truncated,
            counts,
        })
    }
}

fn check_node(
    node: &NodeSnapshot,
    all: &FxHashMap<NodeId, NodeSnapshot>,
    findings: &mut Findings,
    counts: &mut VerifyCounts,
) {
    let mut names = FxHashSet::default();
    for reference in &node.forward {
        if reference.direction() != Direction::Forward || reference.source() != node.id {
            findings.push(node.id, "forward list holds a foreign reference");
        }
        if !names.insert(reference.identifier().clone()) {
            findings.push(
                node.id,
                format!("duplicate forward identifier {}", reference.identifier()),
            );
        }
        match reference.kind() {
            ReferenceKind::Child => counts.child_edges += 1,
            ReferenceKind::Link => counts.link_edges += 1,
        }
        match all.get(&reference.target()) {
            Some(target) if target.inverse.contains(&reference.inverse()) => {}
            Some(_) => findings.push(
                node.id,
                format!("{} has no matching inverse reference", reference.target()),
            ),
            None => findings.push(
                node.id,
                format!("forward reference to missing node {}", reference.target()),
            ),
        }
    }

    let parents: Vec<_> = node.inverse.iter().filter(|r| r.is_child()).collect();
    if parents.len() > 1 {
        findings.push(node.id, format!("{} parent edges", parents.len()));
    }
    if node.parent != parents.first().map(|r| r.source()) {
        findings.push(node.id, "parent field disagrees with inverse child edge");
    }
    for reference in &node.inverse {
        let matched = all
            .get(&reference.source())
            .map_or(false, |source| source.forward.contains(&reference.inverse()));
        if !matched {
            findings.push(
                node.id,
                format!("inverse reference from {} has no forward half", reference.source()),
            );
        }
    }

    match node.parent.and_then(|parent| all.get(&parent)) {
        Some(parent) => {
            let expected = address::join(&parent.address, node.identifier.as_str());
            if node.address != expected {
                findings.push(
                    node.id,
                    format!("address {} should be {expected}", node.address),
                );
            }
        }
        None if !node.id.is_root() => counts.detached_roots += 1,
        None => {}
    }
}

fn check_root(tree: &Tree, all: &FxHashMap<NodeId, NodeSnapshot>, findings: &mut Findings) {
    match all.get(&NodeId::ROOT) {
        Some(root) => {
            if root.parent.is_some() {
                findings.push(NodeId::ROOT, "root has a parent");
            }
            if root.address != tree.root_identifier().as_str() {
                findings.push(NodeId::ROOT, format!("root address is {}", root.address));
            }
        }
        None => findings.push(NodeId::ROOT, "root node is missing"),
    }
}

/// Three-colour depth-first search over forward references.
fn check_acyclic(all: &FxHashMap<NodeId, NodeSnapshot>, findings: &mut Findings) {
    #[derive(Clone, Copy, PartialEq)]
    enum Colour {
        Grey,
        Black,
    }
    let mut colour: FxHashMap<NodeId, Colour> = FxHashMap::default();
    let mut starts: Vec<NodeId> = all.keys().copied().collect();
    starts.sort_unstable();
    for start in starts {
        if colour.contains_key(&start) {
            continue;
        }
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
        colour.insert(start, Colour::Grey);
        while let Some((id, next)) = stack.pop() {
            let forward = all.get(&id).map(|n| n.forward.as_slice()).unwrap_or(&[]);
            if let Some(reference) = forward.get(next) {
                stack.push((id, next + 1));
                let target = reference.target();
                match colour.get(&target) {
                    Some(Colour::Grey) => {
                        findings.push(id, format!("cycle through {target}"));
                    }
                    Some(Colour::Black) => {}
                    None => {
                        colour.insert(target, Colour::Grey);
                        stack.push((target, 0));
                    }
                }
            } else {
                colour.insert(id, Colour::Black);
            }
        }
    }
}
