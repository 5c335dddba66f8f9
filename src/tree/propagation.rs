//! Upward timestamp propagation.
//!
//! Every ancestor of a touched node receives the batch timestamp. A visited
//! set shared across all starting points bounds the work to one visit per
//! ancestor per batch, and also terminates on a looping parent graph.

#![allow(missing_docs)]

use std::collections::HashSet;

use crate::core::errors::{DtrError, Result};
use crate::model::{NodeId, Timestamp};
use crate::tree::forest::Forest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// Ancestors visited.
    pub visited: usize,
    /// Ancestors whose timestamp actually changed.
    pub stamped: usize,
}

/// Stamp `at` on the parent chains of `touched`, plus the chains starting at
/// each of `extra_starts` (inclusive), e.g. folders that just lost a child.
pub fn propagate(
    forest: &mut Forest,
    touched: &[NodeId],
    extra_starts: &[NodeId],
    at: Timestamp,
) -> Result<PropagationReport> {
    let mut starts: Vec<NodeId> = touched
        .iter()
        .filter_map(|id| forest.get(*id).and_then(|node| node.parent_id))
        .collect();
    starts.extend_from_slice(extra_starts);

    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut report = PropagationReport::default();
    for start in starts {
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            if !visited.insert(id) {
                break;
            }
            let parent = match forest.get(id) {
                Some(node) => node.parent_id,
                None => {
                    return Err(DtrError::Runtime {
                        details: format!("ancestor {id} is missing from the loaded tree"),
                    });
                }
            };
            report.visited += 1;
            if forest.stamp(id, at) {
                report.stamped += 1;
            }
            cursor = parent;
        }
    }

    tracing::debug!(
        visited = report.visited,
        stamped = report.stamped,
        "timestamps propagated"
    );
    Ok(report)
}
