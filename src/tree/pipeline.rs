//! Batch orchestration and the query layer.
//!
//! [`TreeService`] owns the store behind a single write lock. An import runs
//! as one store transaction:
//!
//! ```text
//! validate → lock → begin → load arena → reconcile → propagate timestamps
//!          → recompute sizes → select history → write dirty rows → commit
//! ```
//!
//! Any failure drops the transaction, so no partial batch is ever visible.
//! Reads take the same lock and therefore only observe committed state.

#![allow(missing_docs)]

use std::time::Instant;

use parking_lot::Mutex;

use crate::core::config::Config;
use crate::core::errors::{DtrError, Result};
use crate::logger::{ActivityEntry, ActivityLog, EventType, Severity};
use crate::model::wire::{HistoryItem, ImportRequest, NodeView};
use crate::model::{NodeId, Timestamp};
use crate::store::{TreeStore, TreeTx};
use crate::tree::aggregate::recompute_sizes;
use crate::tree::cascade::delete_subtree;
use crate::tree::forest::Forest;
use crate::tree::history::{HistoryPolicy, candidates, snapshots_to_record};
use crate::tree::propagation::propagate;
use crate::tree::query::{assemble, recent_window};
use crate::tree::reconciler::reconcile;
use crate::tree::validator::{ValidatedBatch, validate_batch};

/// Outcome of a committed import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub timestamp: Option<Timestamp>,
    pub items: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Ancestors whose timestamp moved.
    pub stamped: usize,
    /// Folders whose size changed.
    pub resized: usize,
    /// Node rows written.
    pub written: usize,
    /// History records appended.
    pub history: usize,
}

/// Outcome of a committed delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub removed: usize,
    pub history_removed: usize,
    pub resized: usize,
    pub stamped: usize,
    pub history_recorded: usize,
}

/// Rows produced by the post-mutation stages, ready to be written.
struct Settled {
    stamped: usize,
    resized: usize,
    written: usize,
    history: usize,
}

pub struct TreeService {
    store: Mutex<TreeStore>,
    history: HistoryPolicy,
    activity: Option<ActivityLog>,
}

impl TreeService {
    #[must_use]
    pub fn new(store: TreeStore, history: HistoryPolicy) -> Self {
        Self {
            store: Mutex::new(store),
            history,
            activity: None,
        }
    }

    #[must_use]
    pub fn with_activity_log(mut self, log: ActivityLog) -> Self {
        self.activity = Some(log);
        self
    }

    /// Open the configured store and activity log.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = TreeStore::open(&config.store.path, config.store.busy_timeout())?;
        let policy = HistoryPolicy {
            skip_identical_snapshots: config.history.skip_identical_snapshots,
        };
        let service = Self::new(store, policy);
        Ok(if config.logging.activity_log_enabled {
            service.with_activity_log(ActivityLog::open(&config.logging.activity_log))
        } else {
            service
        })
    }

    /// Record an activity entry if an activity log is attached.
    pub fn record_activity(&self, entry: &ActivityEntry) {
        if let Some(log) = &self.activity {
            log.record(entry);
        }
    }

    // ──────────────────── writes ────────────────────

    /// Validate and apply one import request atomically.
    pub fn import(&self, request: &ImportRequest) -> Result<ImportReport> {
        let started = Instant::now();
        let outcome = validate_batch(request).and_then(|batch| self.import_batch(&batch));
        match &outcome {
            Ok(report) => {
                tracing::info!(
                    update_date = %request.update_date,
                    items = report.items,
                    written = report.written,
                    history = report.history,
                    "import committed"
                );
                let mut entry = ActivityEntry::new(EventType::ImportCommitted, Severity::Info);
                entry.date = report.timestamp.map(|ts| ts.to_wire());
                entry.items = Some(report.items);
                entry.created = Some(report.created);
                entry.updated = Some(report.updated);
                entry.written = Some(report.written);
                entry.history = Some(report.history);
                entry.duration_ms = Some(elapsed_ms(started));
                self.record_activity(&entry);
            }
            Err(err) => {
                let severity = if err.is_input_error() {
                    Severity::Warning
                } else {
                    Severity::Error
                };
                if err.is_input_error() {
                    tracing::warn!(code = err.code(), error = %err, "import rejected");
                } else {
                    tracing::error!(code = err.code(), error = %err, "import failed");
                }
                let mut entry =
                    ActivityEntry::new(EventType::ImportRejected, severity).with_error(err);
                entry.date = Some(request.update_date.clone());
                entry.items = Some(request.items.len());
                entry.duration_ms = Some(elapsed_ms(started));
                self.record_activity(&entry);
            }
        }
        outcome
    }

    /// Apply an already validated batch atomically.
    pub fn import_batch(&self, batch: &ValidatedBatch) -> Result<ImportReport> {
        let mut store = self.store.lock();
        let tx = store.begin()?;
        let mut forest = tx.load_forest()?;

        let reconciled = reconcile(&mut forest, batch)?;
        let settled = self.settle(
            &tx,
            &mut forest,
            &reconciled.touched,
            &reconciled.former_parents,
            batch.timestamp,
        )?;
        tx.commit()?;

        Ok(ImportReport {
            timestamp: Some(batch.timestamp),
            items: batch.len(),
            created: reconciled.created,
            updated: reconciled.updated,
            unchanged: reconciled.unchanged,
            stamped: settled.stamped,
            resized: settled.resized,
            written: settled.written,
            history: settled.history,
        })
    }

    /// Remove a node with its whole subtree and history.
    ///
    /// Folder sizes above the removed node are recomputed. With `date`, the
    /// former parent chain is stamped with it and recorded in history.
    pub fn delete(&self, id: NodeId, date: Option<Timestamp>) -> Result<DeleteReport> {
        let started = Instant::now();
        let outcome = self.delete_inner(id, date);
        match &outcome {
            Ok(report) => {
                tracing::info!(%id, removed = report.removed, "node deleted");
                let mut entry = ActivityEntry::new(EventType::NodeDeleted, Severity::Info);
                entry.node_id = Some(id.to_string());
                entry.date = date.map(|ts| ts.to_wire());
                entry.removed = Some(report.removed);
                entry.history = Some(report.history_removed);
                entry.duration_ms = Some(elapsed_ms(started));
                self.record_activity(&entry);
            }
            Err(err) => {
                tracing::warn!(%id, code = err.code(), error = %err, "delete failed");
            }
        }
        outcome
    }

    fn delete_inner(&self, id: NodeId, date: Option<Timestamp>) -> Result<DeleteReport> {
        let mut store = self.store.lock();
        let tx = store.begin()?;
        let target = tx.get_node(id)?.ok_or(DtrError::NotFound { id })?;

        let cascade = delete_subtree(&tx, id)?;
        let mut forest = tx.load_forest()?;

        let mut report = DeleteReport {
            removed: cascade.removed.len(),
            history_removed: cascade.history,
            ..DeleteReport::default()
        };
        match (date, target.parent_id) {
            (Some(at), Some(parent)) => {
                let settled = self.settle(&tx, &mut forest, &[], &[parent], at)?;
                report.stamped = settled.stamped;
                report.resized = settled.resized;
                report.history_recorded = settled.history;
            }
            _ => {
                report.resized = recompute_sizes(&mut forest)?.changed.len();
                tx.upsert_nodes(forest.dirty_nodes())?;
            }
        }
        tx.commit()?;
        Ok(report)
    }

    /// Propagate, aggregate, select history and write everything the arena
    /// changed. Shared by import and dated delete.
    fn settle(
        &self,
        tx: &TreeTx<'_>,
        forest: &mut Forest,
        touched: &[NodeId],
        extra_starts: &[NodeId],
        at: Timestamp,
    ) -> Result<Settled> {
        let propagated = propagate(forest, touched, extra_starts, at)?;
        let aggregated = recompute_sizes(forest)?;

        let candidate_ids = candidates(forest, at);
        let latest = tx.latest_snapshots(&candidate_ids)?;
        let snapshots = snapshots_to_record(forest, &candidate_ids, &latest, self.history);

        let written = tx.upsert_nodes(forest.dirty_nodes())?;
        for (node_id, snapshot) in &snapshots {
            tx.append_history(*node_id, snapshot)?;
        }
        Ok(Settled {
            stamped: propagated.stamped,
            resized: aggregated.changed.len(),
            written,
            history: snapshots.len(),
        })
    }

    // ──────────────────── reads ────────────────────

    /// A node with its children expanded recursively.
    pub fn get_node(&self, id: NodeId) -> Result<NodeView> {
        let nodes = self.store.lock().subtree(id)?;
        assemble(&nodes).ok_or(DtrError::NotFound { id })
    }

    /// Files modified in the day ending at `date`.
    pub fn recent_files(&self, date: Timestamp) -> Result<Vec<NodeView>> {
        let (after, until) = recent_window(date);
        let files = self.store.lock().files_modified_between(after, until)?;
        Ok(files.iter().map(NodeView::leaf).collect())
    }

    /// History of one node with `date` in `[start, end]`, oldest first.
    pub fn history(&self, id: NodeId, start: Timestamp, end: Timestamp) -> Result<Vec<HistoryItem>> {
        let store = self.store.lock();
        if store.get_node(id)?.is_none() {
            return Err(DtrError::NotFound { id });
        }
        let records = store.history_between(id, start, end)?;
        Ok(records.iter().map(HistoryItem::from).collect())
    }

    /// Number of stored nodes and history records.
    pub fn counts(&self) -> Result<(usize, usize)> {
        let store = self.store.lock();
        Ok((store.node_count()?, store.history_count()?))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
