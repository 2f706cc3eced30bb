//! Iterative graph walks used by validation and re-addressing.
//!
//! All walks use an explicit stack, so arbitrarily deep trees cannot
//! exhaust the thread stack. The forward graph is a DAG once links are
//! involved, hence the visited sets.

use rustc_hash::FxHashSet;

use super::Tree;
use crate::address;
use crate::types::NodeId;

impl Tree {
    /// Returns true if `to` can be reached from `from` over forward
    /// references of any kind, including the trivial path `from == to`.
    pub(crate) fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.slot(current) {
                let state = node.state.lock();
                stack.extend(
                    state
                        .forward
                        .iter()
                        .map(|r| r.target())
                        .filter(|t| !visited.contains(t)),
                );
            }
        }
        false
    }

    /// Collects `start` and every node reachable from it over Child edges,
    /// in depth-first pre-order.
    pub(crate) fn child_subtree(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            order.push(current);
            if let Some(node) = self.slot(current) {
                let state = node.state.lock();
                let children: Vec<NodeId> = state.child_targets().collect();
                stack.extend(children.into_iter().rev());
            }
        }
        order
    }

    /// Finds the first node of `subtree` that is the target of a link.
    ///
    /// With `internal` given, links whose source lies inside that set are
    /// ignored.
    pub(crate) fn linked_node_in_subtree(
        &self,
        subtree: &[NodeId],
        internal: Option<&FxHashSet<NodeId>>,
    ) -> Option<NodeId> {
        subtree.iter().copied().find(|id| {
            let Some(node) = self.slot(*id) else {
                return false;
            };
            let state = node.state.lock();
            match internal {
                None => state.has_inverse_link(),
                Some(set) => state
                    .inverse
                    .iter()
                    .any(|r| r.is_link() && !set.contains(&r.source())),
            }
        })
    }

    /// Rewrites the address of every Child descendant below a node whose
    /// address just became `base`.
    ///
    /// `children` are the Child targets of that node. Link targets are not
    /// followed; they keep their canonical address.
    pub(crate) fn readdress(&self, children: Vec<NodeId>, base: String) -> usize {
        let mut rewritten = 0;
        let mut stack: Vec<(NodeId, String)> =
            children.into_iter().map(|id| (id, base.clone())).collect();
        while let Some((id, parent_address)) = stack.pop() {
            let Some(node) = self.slot(id) else {
                continue;
            };
            let mut state = node.state.lock();
            state.address = address::join(&parent_address, node.identifier.as_str());
            rewritten += 1;
            let next = state.address.clone();
            stack.extend(state.child_targets().map(|child| (child, next.clone())));
        }
        rewritten
    }
}
