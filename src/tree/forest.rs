//! Arena-indexed in-memory view of the forest used while a batch is applied.
//!
//! Nodes live in a map keyed by id with a separate parent → children index.
//! Every walk is iterative and carries a visited set, so a corrupted parent
//! graph surfaces as [`DtrError::CycleDetected`] instead of a stack overflow.
//! Mutations mark nodes dirty so that only changed rows are written back.

#![allow(missing_docs)]

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::errors::{DtrError, Result};
use crate::model::{Node, NodeId, NodeKind, Timestamp};

/// Result of [`Forest::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Default, Clone)]
pub struct Forest {
    nodes: HashMap<NodeId, Node>,
    children: HashMap<NodeId, BTreeSet<NodeId>>,
    dirty: HashSet<NodeId>,
}

impl Forest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a clean (nothing dirty) arena from stored nodes.
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut forest = Self::new();
        for node in nodes {
            forest.link(node.id, node.parent_id);
            forest.nodes.insert(node.id, node);
        }
        forest
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Direct children of `id`, in id order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children.get(&id).into_iter().flatten().copied()
    }

    /// Nodes without a parent, in id order.
    #[must_use]
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|node| node.is_root())
            .map(|node| node.id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// Insert a new node or replace an existing one, keeping the child index
    /// consistent when the parent changes.
    pub fn upsert(&mut self, node: Node) -> UpsertOutcome {
        let id = node.id;
        match self.nodes.get(&id) {
            None => {
                self.link(id, node.parent_id);
                self.nodes.insert(id, node);
                self.dirty.insert(id);
                UpsertOutcome::Created
            }
            Some(existing) if *existing == node => UpsertOutcome::Unchanged,
            Some(existing) => {
                let previous_parent = existing.parent_id;
                if previous_parent != node.parent_id {
                    self.unlink(id, previous_parent);
                    self.link(id, node.parent_id);
                }
                self.nodes.insert(id, node);
                self.dirty.insert(id);
                UpsertOutcome::Updated
            }
        }
    }

    /// Set `modified_at`. Returns whether the stored value changed.
    pub fn stamp(&mut self, id: NodeId, at: Timestamp) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) if node.modified_at != at => {
                node.modified_at = at;
                self.dirty.insert(id);
                true
            }
            _ => false,
        }
    }

    /// Set a folder's derived size. Files are left untouched. Returns whether
    /// the stored value changed.
    pub fn set_folder_size(&mut self, id: NodeId, size: Option<u64>) -> bool {
        match self.nodes.get_mut(&id) {
            Some(Node {
                kind: NodeKind::Folder { size: current },
                ..
            }) if *current != size => {
                *current = size;
                self.dirty.insert(id);
                true
            }
            _ => false,
        }
    }

    /// Whether walking up from `start` reaches `target`. `start` itself counts.
    ///
    /// Fails with `CycleDetected` if the parent chain loops back on itself
    /// before reaching a root.
    pub fn chain_reaches(&self, start: NodeId, target: NodeId) -> Result<bool> {
        let mut visited = HashSet::new();
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if id == target {
                return Ok(true);
            }
            if !visited.insert(id) {
                return Err(DtrError::CycleDetected {
                    details: format!("parent chain starting at {start} revisits {id}"),
                });
            }
            cursor = self.nodes.get(&id).and_then(|node| node.parent_id);
        }
        Ok(false)
    }

    /// `root` and all of its descendants in breadth-first order.
    #[must_use]
    pub fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        if !self.contains(root) {
            return Vec::new();
        }
        let mut order = vec![root];
        let mut seen: HashSet<NodeId> = HashSet::from([root]);
        let mut next = 0;
        while next < order.len() {
            let id = order[next];
            next += 1;
            for child in self.children(id) {
                if seen.insert(child) {
                    order.push(child);
                }
            }
        }
        order
    }

    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Nodes changed since the arena was loaded, in id order.
    #[must_use]
    pub fn dirty_nodes(&self) -> Vec<&Node> {
        let mut ids: Vec<NodeId> = self.dirty.iter().copied().collect();
        ids.sort_unstable();
        ids.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    fn link(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(parent) = parent {
            self.children.entry(parent).or_default().insert(id);
        }
    }

    fn unlink(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(parent) = parent
            && let Some(siblings) = self.children.get_mut(&parent)
        {
            siblings.remove(&id);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{file, folder, ts};
    use super::*;

    const T1: &str = "2022-02-01T12:00:00Z";
    const T2: &str = "2022-02-02T12:00:00Z";

    #[test]
    fn from_nodes_builds_child_index() {
        let root = NodeId::random();
        let a = NodeId::random();
        let b = NodeId::random();
        let forest = Forest::from_nodes([
            folder(root, None, T1),
            file(a, Some(root), 1, T1),
            file(b, Some(root), 2, T1),
        ]);
        let mut expected = vec![a, b];
        expected.sort_unstable();
        assert_eq!(forest.children(root).collect::<Vec<_>>(), expected);
        assert_eq!(forest.roots(), vec![root]);
        assert_eq!(forest.dirty_count(), 0);
    }

    #[test]
    fn upsert_relinks_on_parent_change() {
        let left = NodeId::random();
        let right = NodeId::random();
        let leaf = NodeId::random();
        let mut forest = Forest::from_nodes([
            folder(left, None, T1),
            folder(right, None, T1),
            file(leaf, Some(left), 5, T1),
        ]);

        let outcome = forest.upsert(file(leaf, Some(right), 5, T2));
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(forest.children(left).count(), 0);
        assert_eq!(forest.children(right).collect::<Vec<_>>(), vec![leaf]);
        assert_eq!(forest.dirty_count(), 1);
    }

    #[test]
    fn identical_upsert_is_unchanged() {
        let id = NodeId::random();
        let mut forest = Forest::from_nodes([folder(id, None, T1)]);
        assert_eq!(
            forest.upsert(folder(id, None, T1)),
            UpsertOutcome::Unchanged
        );
        assert_eq!(forest.dirty_count(), 0);
    }

    #[test]
    fn stamp_and_size_only_dirty_on_change() {
        let id = NodeId::random();
        let mut forest = Forest::from_nodes([folder(id, None, T1)]);
        assert!(!forest.stamp(id, ts(T1)));
        assert!(!forest.set_folder_size(id, None));
        assert_eq!(forest.dirty_count(), 0);
        assert!(forest.stamp(id, ts(T2)));
        assert!(forest.set_folder_size(id, Some(3)));
        assert_eq!(forest.dirty_nodes().len(), 1);
    }

    #[test]
    fn set_folder_size_ignores_files() {
        let id = NodeId::random();
        let mut forest = Forest::from_nodes([file(id, None, 9, T1)]);
        assert!(!forest.set_folder_size(id, Some(1)));
        assert_eq!(forest.get(id).unwrap().kind.size(), Some(9));
    }

    #[test]
    fn chain_reaches_finds_ancestors() {
        let root = NodeId::random();
        let mid = NodeId::random();
        let leaf = NodeId::random();
        let forest = Forest::from_nodes([
            folder(root, None, T1),
            folder(mid, Some(root), T1),
            folder(leaf, Some(mid), T1),
        ]);
        assert!(forest.chain_reaches(leaf, root).unwrap());
        assert!(forest.chain_reaches(leaf, leaf).unwrap());
        assert!(!forest.chain_reaches(root, leaf).unwrap());
    }

    #[test]
    fn chain_reaches_reports_loops() {
        let a = NodeId::random();
        let b = NodeId::random();
        let outsider = NodeId::random();
        let forest = Forest::from_nodes([folder(a, Some(b), T1), folder(b, Some(a), T1)]);
        let err = forest.chain_reaches(a, outsider).unwrap_err();
        assert_eq!(err.code(), "DTR-3001");
    }

    #[test]
    fn subtree_is_breadth_first() {
        let root = NodeId::random();
        let mid = NodeId::random();
        let leaf = NodeId::random();
        let other = NodeId::random();
        let forest = Forest::from_nodes([
            folder(root, None, T1),
            folder(mid, Some(root), T1),
            file(leaf, Some(mid), 1, T1),
            folder(other, None, T1),
        ]);
        assert_eq!(forest.subtree(root), vec![root, mid, leaf]);
        assert!(forest.subtree(NodeId::random()).is_empty());
    }
}
