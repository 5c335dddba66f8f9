//! Selects the snapshots a committed batch appends to history.

#![allow(missing_docs)]

use std::collections::HashMap;

use crate::model::{HistorySnapshot, NodeId, Timestamp};
use crate::tree::forest::Forest;

/// How the recorder treats nodes whose state did not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPolicy {
    /// Skip a node whose snapshot equals its latest stored record, so that
    /// replaying a batch with the same timestamp appends nothing.
    pub skip_identical_snapshots: bool,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            skip_identical_snapshots: true,
        }
    }
}

/// Nodes whose `modified_at` is exactly `at`, in id order.
#[must_use]
pub fn candidates(forest: &Forest, at: Timestamp) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = forest
        .nodes()
        .filter(|node| node.modified_at == at)
        .map(|node| node.id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Snapshots to append for `candidate_ids`, given each node's latest stored
/// snapshot (absent for nodes with no history yet).
#[must_use]
pub fn snapshots_to_record(
    forest: &Forest,
    candidate_ids: &[NodeId],
    latest: &HashMap<NodeId, HistorySnapshot>,
    policy: HistoryPolicy,
) -> Vec<(NodeId, HistorySnapshot)> {
    candidate_ids
        .iter()
        .filter_map(|id| forest.get(*id))
        .map(|node| (node.id, HistorySnapshot::of(node)))
        .filter(|(id, snapshot)| {
            !(policy.skip_identical_snapshots && latest.get(id) == Some(snapshot))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::forest::fixtures::{file, folder, ts};

    const T1: &str = "2022-02-01T12:00:00Z";
    const T2: &str = "2022-02-02T12:00:00Z";

    #[test]
    fn only_nodes_stamped_with_the_batch_time_are_candidates() {
        let root = NodeId::random();
        let fresh = NodeId::random();
        let forest = Forest::from_nodes([
            folder(root, None, T1),
            file(fresh, Some(root), 1, T2),
        ]);
        assert_eq!(candidates(&forest, ts(T2)), vec![fresh]);
    }

    #[test]
    fn identical_snapshots_are_skipped_when_enabled() {
        let id = NodeId::random();
        let forest = Forest::from_nodes([file(id, None, 4, T2)]);
        let snapshot = HistorySnapshot::of(forest.get(id).unwrap());
        let latest = HashMap::from([(id, snapshot)]);

        let skipped = snapshots_to_record(&forest, &[id], &latest, HistoryPolicy::default());
        assert!(skipped.is_empty());

        let always = HistoryPolicy {
            skip_identical_snapshots: false,
        };
        assert_eq!(snapshots_to_record(&forest, &[id], &latest, always).len(), 1);
    }

    #[test]
    fn changed_snapshot_is_recorded() {
        let id = NodeId::random();
        let forest = Forest::from_nodes([file(id, None, 4, T2)]);
        let mut previous = HistorySnapshot::of(forest.get(id).unwrap());
        previous.size = Some(3);
        previous.date = ts(T1);
        let latest = HashMap::from([(id, previous)]);

        let recorded = snapshots_to_record(&forest, &[id], &latest, HistoryPolicy::default());
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1.size, Some(4));
        assert_eq!(recorded[0].1.date, ts(T2));
    }
}
