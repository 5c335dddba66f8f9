//! Applies a validated batch to the arena.
//!
//! Three passes over the batch:
//! 1. resolve every item against the stored tree, falling back to the batch's
//!    own new items (a batch may create a folder and its children together),
//!    and reject kind changes;
//! 2. upsert every item with the batch timestamp;
//! 3. reject any item whose new parent chain leads back to itself.
//!
//! Pass 3 runs after all items are applied so that cycles formed by several
//! items of one batch are caught. The arena is discarded on failure, so
//! nothing reaches the store.

#![allow(missing_docs)]

use std::collections::HashMap;

use crate::core::errors::{DtrError, Result};
use crate::model::{Node, NodeId, NodeKind, NodeType};
use crate::tree::forest::{Forest, UpsertOutcome};
use crate::tree::validator::{NodeUpsert, ValidatedBatch};

/// What the reconciler did to the arena.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Every node named in the batch, in batch order.
    pub touched: Vec<NodeId>,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Parents that lost a child because an item moved elsewhere.
    pub former_parents: Vec<NodeId>,
}

pub fn reconcile(forest: &mut Forest, batch: &ValidatedBatch) -> Result<ReconcileReport> {
    let incoming: HashMap<NodeId, &NodeUpsert> =
        batch.items.iter().map(|item| (item.id, item)).collect();

    for item in &batch.items {
        check_kind_is_stable(forest, item)?;
        if let Some(parent_id) = item.parent_id {
            check_parent(forest, &incoming, item.id, parent_id)?;
        }
    }

    let mut report = ReconcileReport::default();
    for item in &batch.items {
        let previous_parent = forest.get(item.id).map(|stored| stored.parent_id);
        let node = Node {
            id: item.id,
            parent_id: item.parent_id,
            kind: merged_kind(forest, item),
            modified_at: batch.timestamp,
        };
        match forest.upsert(node) {
            UpsertOutcome::Created => report.created += 1,
            UpsertOutcome::Updated => report.updated += 1,
            UpsertOutcome::Unchanged => report.unchanged += 1,
        }
        if let Some(Some(former)) = previous_parent
            && Some(former) != item.parent_id
        {
            report.former_parents.push(former);
        }
        report.touched.push(item.id);
    }

    // A chain that revisits a node without reaching the item is a fault in
    // stored data, unless some other item of this batch closes the loop.
    let mut stored_fault = None;
    for item in &batch.items {
        if let Some(parent_id) = item.parent_id {
            match forest.chain_reaches(parent_id, item.id) {
                Ok(true) => {
                    return Err(DtrError::CyclicParent {
                        id: item.id,
                        parent_id,
                    });
                }
                Ok(false) => {}
                Err(err) => {
                    stored_fault.get_or_insert(err);
                }
            }
        }
    }
    if let Some(err) = stored_fault {
        return Err(err);
    }

    tracing::debug!(
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        moved = report.former_parents.len(),
        "batch reconciled"
    );
    Ok(report)
}

fn check_kind_is_stable(forest: &Forest, item: &NodeUpsert) -> Result<()> {
    if let Some(stored) = forest.get(item.id) {
        let requested = item.kind.node_type();
        if stored.node_type() != requested {
            return Err(DtrError::ImmutableKindViolation {
                id: item.id,
                stored: stored.node_type().as_str(),
                requested: requested.as_str(),
            });
        }
    }
    Ok(())
}

fn check_parent(
    forest: &Forest,
    incoming: &HashMap<NodeId, &NodeUpsert>,
    id: NodeId,
    parent_id: NodeId,
) -> Result<()> {
    let parent_type = forest
        .get(parent_id)
        .map(Node::node_type)
        .or_else(|| incoming.get(&parent_id).map(|item| item.kind.node_type()));
    match parent_type {
        None => Err(DtrError::UnresolvedParent { id, parent_id }),
        Some(NodeType::File) => Err(DtrError::InvalidParentType { id, parent_id }),
        Some(NodeType::Folder) => Ok(()),
    }
}

/// Folder sizes are derived, so an update keeps the stored aggregate until the
/// aggregator recomputes it.
fn merged_kind(forest: &Forest, item: &NodeUpsert) -> NodeKind {
    match (&item.kind, forest.get(item.id).map(|stored| &stored.kind)) {
        (NodeKind::Folder { .. }, Some(NodeKind::Folder { size })) => {
            NodeKind::Folder { size: *size }
        }
        (kind, _) => kind.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Timestamp;
    use crate::tree::forest::fixtures::{file, folder, ts};

    const T1: &str = "2022-02-01T12:00:00Z";
    const T2: &str = "2022-02-02T12:00:00Z";

    fn batch(items: Vec<NodeUpsert>, at: &str) -> ValidatedBatch {
        ValidatedBatch {
            items,
            timestamp: Timestamp::parse(at).unwrap(),
        }
    }

    fn folder_item(id: NodeId, parent: Option<NodeId>) -> NodeUpsert {
        NodeUpsert {
            id,
            parent_id: parent,
            kind: NodeKind::folder(),
        }
    }

    fn file_item(id: NodeId, parent: Option<NodeId>, size: u64) -> NodeUpsert {
        NodeUpsert {
            id,
            parent_id: parent,
            kind: NodeKind::File {
                url: Some("/f".to_string()),
                size,
            },
        }
    }

    #[test]
    fn creates_parent_and_child_in_one_batch_in_any_order() {
        let root = NodeId::random();
        let child = NodeId::random();
        let mut forest = Forest::new();
        let report = reconcile(
            &mut forest,
            &batch(
                vec![file_item(child, Some(root), 10), folder_item(root, None)],
                T1,
            ),
        )
        .unwrap();
        assert_eq!(report.created, 2);
        assert_eq!(report.touched, vec![child, root]);
        assert_eq!(forest.children(root).collect::<Vec<_>>(), vec![child]);
        assert_eq!(forest.get(child).unwrap().modified_at, ts(T1));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut forest = Forest::new();
        let err = reconcile(
            &mut forest,
            &batch(vec![folder_item(NodeId::random(), Some(NodeId::random()))], T1),
        )
        .unwrap_err();
        assert_eq!(err.code(), "DTR-2003");
    }

    #[test]
    fn file_parent_is_rejected_whether_stored_or_incoming() {
        let stored_file = NodeId::random();
        let mut forest = Forest::from_nodes([file(stored_file, None, 1, T1)]);
        let err = reconcile(
            &mut forest,
            &batch(vec![folder_item(NodeId::random(), Some(stored_file))], T2),
        )
        .unwrap_err();
        assert_eq!(err.code(), "DTR-2004");

        let new_file = NodeId::random();
        let err = reconcile(
            &mut Forest::new(),
            &batch(
                vec![
                    file_item(new_file, None, 1),
                    file_item(NodeId::random(), Some(new_file), 1),
                ],
                T2,
            ),
        )
        .unwrap_err();
        assert_eq!(err.code(), "DTR-2004");
    }

    #[test]
    fn kind_change_is_rejected() {
        let id = NodeId::random();
        let mut forest = Forest::from_nodes([folder(id, None, T1)]);
        let err = reconcile(&mut forest, &batch(vec![file_item(id, None, 1)], T2)).unwrap_err();
        assert_eq!(err.code(), "DTR-2006");
    }

    #[test]
    fn moving_folder_under_its_descendant_is_rejected() {
        let top = NodeId::random();
        let mid = NodeId::random();
        let low = NodeId::random();
        let mut forest = Forest::from_nodes([
            folder(top, None, T1),
            folder(mid, Some(top), T1),
            folder(low, Some(mid), T1),
        ]);
        let err =
            reconcile(&mut forest, &batch(vec![folder_item(top, Some(low))], T2)).unwrap_err();
        assert_eq!(err.code(), "DTR-2005");
    }

    #[test]
    fn cycle_formed_across_two_items_is_rejected() {
        let a = NodeId::random();
        let b = NodeId::random();
        let mut forest = Forest::from_nodes([folder(a, None, T1), folder(b, None, T1)]);
        let err = reconcile(
            &mut forest,
            &batch(vec![folder_item(a, Some(b)), folder_item(b, Some(a))], T2),
        )
        .unwrap_err();
        assert_eq!(err.code(), "DTR-2005");
    }

    #[test]
    fn cycle_already_in_stored_tree_is_a_fault_not_a_caller_error() {
        let a = NodeId::random();
        let b = NodeId::random();
        let mut forest = Forest::from_nodes([folder(a, Some(b), T1), folder(b, Some(a), T1)]);
        let err = reconcile(
            &mut forest,
            &batch(vec![file_item(NodeId::random(), Some(a), 1)], T2),
        )
        .unwrap_err();
        assert_eq!(err.code(), "DTR-3001");
        assert!(!err.is_input_error());
    }

    #[test]
    fn new_item_closing_a_loop_is_still_blamed_on_the_batch() {
        let a = NodeId::random();
        let b = NodeId::random();
        let leaf = NodeId::random();
        let mut forest = Forest::from_nodes([folder(a, None, T1), folder(b, Some(a), T1)]);
        let err = reconcile(
            &mut forest,
            &batch(
                vec![file_item(leaf, Some(b), 1), folder_item(a, Some(b))],
                T2,
            ),
        )
        .unwrap_err();
        assert_eq!(err.code(), "DTR-2005");
    }

    #[test]
    fn update_keeps_folder_aggregate_and_records_former_parent() {
        let old_parent = NodeId::random();
        let new_parent = NodeId::random();
        let dir = NodeId::random();
        let mut stored_dir = folder(dir, Some(old_parent), T1);
        stored_dir.kind = NodeKind::Folder { size: Some(42) };
        let mut forest = Forest::from_nodes([
            folder(old_parent, None, T1),
            folder(new_parent, None, T1),
            stored_dir,
        ]);

        let report =
            reconcile(&mut forest, &batch(vec![folder_item(dir, Some(new_parent))], T2)).unwrap();
        assert_eq!(report.updated, 1);
        assert_eq!(report.former_parents, vec![old_parent]);
        let node = forest.get(dir).unwrap();
        assert_eq!(node.kind.size(), Some(42));
        assert_eq!(node.modified_at, ts(T2));
    }

    #[test]
    fn replaying_identical_item_is_unchanged() {
        let id = NodeId::random();
        let mut forest = Forest::from_nodes([file(id, None, 7, T1)]);
        let stored = forest.get(id).unwrap().clone();
        let item = NodeUpsert {
            id,
            parent_id: None,
            kind: stored.kind.clone(),
        };
        let report = reconcile(&mut forest, &batch(vec![item], T1)).unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(forest.dirty_count(), 0);
    }
}
