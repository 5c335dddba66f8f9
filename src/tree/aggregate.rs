//! Bottom-up folder size recomputation over the whole forest.
//!
//! Iterative post-order traversal from every root with an explicit stack. A
//! folder's size is the sum of its file descendants' sizes, or absent when it
//! has no file descendants at all. Only values that differ from the stored
//! aggregate are written back.

#![allow(missing_docs)]

use std::collections::HashMap;

use crate::core::errors::{DtrError, Result};
use crate::model::{NodeId, NodeKind};
use crate::tree::forest::Forest;

/// Largest folder size the store can hold (a signed 64-bit column).
pub const MAX_FOLDER_SIZE: u64 = i64::MAX.unsigned_abs();

/// Bytes and file count below (and including) one node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Totals {
    bytes: u64,
    files: u64,
}

impl Totals {
    /// Add a child's totals. `None` once the byte count leaves the storable range.
    fn absorb(&mut self, other: Self) -> Option<()> {
        self.bytes = self
            .bytes
            .checked_add(other.bytes)
            .filter(|bytes| *bytes <= MAX_FOLDER_SIZE)?;
        self.files += other.files;
        Some(())
    }

    fn folder_size(self) -> Option<u64> {
        (self.files > 0).then_some(self.bytes)
    }
}

#[derive(Debug, Clone, Copy)]
enum Visit {
    Open,
    Closed(Totals),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub folders: usize,
    /// Folders whose stored size changed, in the order they were settled.
    pub changed: Vec<NodeId>,
}

/// Recompute every folder size reachable from a root.
///
/// Fails with `CycleDetected` if the traversal meets a node that is still
/// open (a back edge) or if some stored nodes cannot be reached from any root.
pub fn recompute_sizes(forest: &mut Forest) -> Result<AggregateReport> {
    let mut visits: HashMap<NodeId, Visit> = HashMap::with_capacity(forest.len());
    let mut settled: Vec<(NodeId, Option<u64>)> = Vec::new();
    let mut stack: Vec<(NodeId, bool)> = Vec::new();

    for root in forest.roots() {
        stack.push((root, false));
        while let Some((id, children_done)) = stack.pop() {
            if children_done {
                let totals = close(forest, &visits, id)?;
                visits.insert(id, Visit::Closed(totals));
                if forest.get(id).is_some_and(|node| node.kind.is_folder()) {
                    settled.push((id, totals.folder_size()));
                }
                continue;
            }
            match visits.get(&id) {
                Some(Visit::Open) => {
                    return Err(DtrError::CycleDetected {
                        details: format!("node {id} is its own ancestor"),
                    });
                }
                Some(Visit::Closed(_)) => continue,
                None => {}
            }
            visits.insert(id, Visit::Open);
            stack.push((id, true));
            for child in forest.children(id) {
                if let Some(Visit::Open) = visits.get(&child) {
                    return Err(DtrError::CycleDetected {
                        details: format!("node {child} is an ancestor of its parent {id}"),
                    });
                }
                stack.push((child, false));
            }
        }
    }

    if visits.len() != forest.len() {
        let mut stranded: Vec<NodeId> = forest
            .nodes()
            .map(|node| node.id)
            .filter(|id| !visits.contains_key(id))
            .collect();
        stranded.sort_unstable();
        stranded.truncate(3);
        return Err(DtrError::CycleDetected {
            details: format!(
                "{} node(s) unreachable from any root, e.g. {stranded:?}",
                forest.len() - visits.len()
            ),
        });
    }

    let mut report = AggregateReport {
        folders: settled.len(),
        changed: Vec::new(),
    };
    for (id, size) in settled {
        if forest.set_folder_size(id, size) {
            report.changed.push(id);
        }
    }

    tracing::debug!(
        folders = report.folders,
        changed = report.changed.len(),
        "folder sizes recomputed"
    );
    Ok(report)
}

fn close(forest: &Forest, visits: &HashMap<NodeId, Visit>, id: NodeId) -> Result<Totals> {
    match forest.get(id).map(|node| &node.kind) {
        Some(NodeKind::File { size, .. }) => Ok(Totals {
            bytes: *size,
            files: 1,
        }),
        Some(NodeKind::Folder { .. }) => {
            let mut totals = Totals::default();
            for child in forest.children(id) {
                if let Some(Visit::Closed(child_totals)) = visits.get(&child) {
                    totals.absorb(*child_totals).ok_or_else(|| {
                        DtrError::validation(format!(
                            "folder {id}: total size exceeds {MAX_FOLDER_SIZE} bytes"
                        ))
                    })?;
                }
            }
            Ok(totals)
        }
        None => Ok(Totals::default()),
    }
}
