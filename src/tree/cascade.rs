//! Explicit subtree removal inside a store transaction.

#![allow(missing_docs)]

use std::collections::HashSet;

use crate::core::errors::{DtrError, Result};
use crate::model::NodeId;
use crate::store::TreeTx;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Removed node ids, leaf first.
    pub removed: Vec<NodeId>,
    /// History rows removed across the whole subtree.
    pub history: usize,
}

/// Delete `root`, every descendant, and every history row that references any
/// of them. Rows are removed leaf first; the caller commits.
pub fn delete_subtree(tx: &TreeTx<'_>, root: NodeId) -> Result<CascadeReport> {
    let mut order = vec![root];
    let mut seen: HashSet<NodeId> = HashSet::from([root]);
    let mut next = 0;
    while next < order.len() {
        let id = order[next];
        next += 1;
        for child in tx.child_ids(id)? {
            if !seen.insert(child) {
                return Err(DtrError::CycleDetected {
                    details: format!("node {child} reached twice below {root}"),
                });
            }
            order.push(child);
        }
    }

    let mut report = CascadeReport::default();
    for id in order.into_iter().rev() {
        report.history += tx.delete_history_of(id)?;
        tx.delete_node_row(id)?;
        report.removed.push(id);
    }

    tracing::debug!(
        %root,
        nodes = report.removed.len(),
        history = report.history,
        "subtree removed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HistorySnapshot;
    use crate::store::TreeStore;
    use crate::tree::forest::fixtures::{file, folder};

    const T1: &str = "2022-02-01T12:00:00Z";

    #[test]
    fn removes_subtree_and_its_history_only() {
        let mut store = TreeStore::open_in_memory().unwrap();
        let root = NodeId::random();
        let doomed = NodeId::random();
        let leaf = NodeId::random();
        let survivor = NodeId::random();
        let nodes = [
            folder(root, None, T1),
            folder(doomed, Some(root), T1),
            file(leaf, Some(doomed), 8, T1),
            file(survivor, Some(root), 2, T1),
        ];
        let tx = store.begin().unwrap();
        tx.upsert_nodes(&nodes).unwrap();
        for node in &nodes {
            tx.append_history(node.id, &HistorySnapshot::of(node)).unwrap();
        }
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        let report = delete_subtree(&tx, doomed).unwrap();
        tx.commit().unwrap();

        assert_eq!(report.removed, vec![leaf, doomed]);
        assert_eq!(report.history, 2);
        assert_eq!(store.node_count().unwrap(), 2);
        assert_eq!(store.history_count().unwrap(), 2);
        assert!(store.get_node(leaf).unwrap().is_none());
        assert!(store.get_node(survivor).unwrap().is_some());
    }

    #[test]
    fn uncommitted_cascade_changes_nothing() {
        let mut store = TreeStore::open_in_memory().unwrap();
        let root = NodeId::random();
        let tx = store.begin().unwrap();
        tx.upsert_nodes(&[folder(root, None, T1), file(NodeId::random(), Some(root), 1, T1)])
            .unwrap();
        tx.commit().unwrap();

        {
            let tx = store.begin().unwrap();
            delete_subtree(&tx, root).unwrap();
        }
        assert_eq!(store.node_count().unwrap(), 2);
    }
}
