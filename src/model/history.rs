//! Append-only point-in-time snapshots of nodes.

use crate::model::{Node, NodeId, NodeType, Timestamp};

/// Observable state of a node at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySnapshot {
    pub node_type: NodeType,
    pub url: Option<String>,
    pub size: Option<u64>,
    pub parent_id: Option<NodeId>,
    pub date: Timestamp,
}

impl HistorySnapshot {
    #[must_use]
    pub fn of(node: &Node) -> Self {
        Self {
            node_type: node.node_type(),
            url: node.kind.url().map(str::to_string),
            size: node.kind.size(),
            parent_id: node.parent_id,
            date: node.modified_at,
        }
    }
}

/// A stored snapshot. `id` is the store-assigned surrogate key; records are
/// never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub id: i64,
    pub node_id: NodeId,
    pub snapshot: HistorySnapshot,
}
