//! Read-side helpers: the recently-changed window and subtree assembly.

#![allow(missing_docs)]

use std::collections::HashMap;

use chrono::TimeDelta;

use crate::model::wire::NodeView;
use crate::model::{Node, NodeId, Timestamp};

/// Width of the recently-changed window, in hours.
pub const RECENT_WINDOW_HOURS: i64 = 24;

/// Bounds `(after, until)` of the window ending at `date`; `after` is
/// exclusive and `until` inclusive.
#[must_use]
pub fn recent_window(date: Timestamp) -> (Timestamp, Timestamp) {
    (date.minus(TimeDelta::hours(RECENT_WINDOW_HOURS)), date)
}

/// Nest a breadth-first subtree listing into one view rooted at its first node.
///
/// Children keep the order they appear in `nodes`. Nodes whose parent is not
/// part of the listing are dropped. Returns `None` for an empty listing.
#[must_use]
pub fn assemble(nodes: &[Node]) -> Option<NodeView> {
    let root = nodes.first()?.id;
    let mut views: HashMap<NodeId, NodeView> =
        nodes.iter().map(|node| (node.id, NodeView::leaf(node))).collect();

    // Reverse BFS order settles every child before its parent. Children are
    // pushed in reverse, so each list is flipped once its owner is attached.
    for node in nodes.iter().rev() {
        if node.id == root {
            continue;
        }
        let Some(mut view) = views.remove(&node.id) else {
            continue;
        };
        if let Some(children) = view.children.as_mut() {
            children.reverse();
        }
        if let Some(parent_id) = node.parent_id
            && let Some(parent) = views.get_mut(&parent_id)
            && let Some(siblings) = parent.children.as_mut()
        {
            siblings.push(view);
        }
    }

    let mut view = views.remove(&root)?;
    if let Some(children) = view.children.as_mut() {
        children.reverse();
    }
    Some(view)
}
