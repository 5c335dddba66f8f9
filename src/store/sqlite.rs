//! SQLite tree store: WAL-mode database holding nodes and their history.
//!
//! All writes go through [`TreeTx`], an immediate transaction that is rolled
//! back when dropped without [`TreeTx::commit`]. Parent references are
//! deferred foreign keys so a batch may insert children before parents.
//! Subtree deletion is not delegated to `ON DELETE CASCADE`; callers remove
//! rows explicitly, leaf first.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use crate::core::errors::{DtrError, Result};
use crate::model::{HistoryRecord, HistorySnapshot, Node, NodeId, NodeKind, NodeType, Timestamp};
use crate::tree::forest::Forest;

const NODE_COLUMNS: &str = "id, kind, url, size, parent_id, modified_at";
const HISTORY_COLUMNS: &str = "id, node_id, kind, url, size, parent_id, date";

/// Durable forest storage.
pub struct TreeStore {
    conn: Connection,
}

impl TreeStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| DtrError::io(parent, source))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(busy_timeout)?;
        apply_pragmas(&conn, true)?;
        apply_schema(&conn)?;

        tracing::debug!(path = %path.display(), "tree store opened");
        Ok(Self { conn })
    }

    /// Private in-memory database, for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn, false)?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Start the write transaction for one batch or delete.
    pub fn begin(&mut self) -> Result<TreeTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(TreeTx { tx })
    }

    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        select_node(&self.conn, id)
    }

    /// Direct children of `id`, in id order.
    pub fn children(&self, id: NodeId) -> Result<Vec<Node>> {
        select_children(&self.conn, id)
    }

    /// `root` and every descendant, breadth first, children in id order.
    /// Empty if `root` does not exist.
    pub fn subtree(&self, root: NodeId) -> Result<Vec<Node>> {
        let Some(node) = select_node(&self.conn, root)? else {
            return Ok(Vec::new());
        };
        let total = node_count(&self.conn)?;
        let mut order = vec![node];
        let mut next = 0;
        while next < order.len() {
            if order.len() > total {
                return Err(DtrError::CycleDetected {
                    details: format!("subtree of {root} revisits stored nodes"),
                });
            }
            let id = order[next].id;
            next += 1;
            order.extend(select_children(&self.conn, id)?);
        }
        Ok(order)
    }

    /// Files whose `modified_at` lies in `(after, until]`, oldest first.
    pub fn files_modified_between(&self, after: Timestamp, until: Timestamp) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes
             WHERE kind = 'FILE' AND modified_at > ?1 AND modified_at <= ?2
             ORDER BY modified_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(params![after.to_storage(), until.to_storage()], read_node_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(NodeRow::into_node).collect()
    }

    /// History of one node with `date` in `[start, end]`, oldest first.
    pub fn history_between(
        &self,
        id: NodeId,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history
             WHERE node_id = ?1 AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![id.to_string(), start.to_storage(), end.to_storage()],
                read_history_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(HistoryRow::into_record).collect()
    }

    /// Every stored node, as a clean arena.
    pub fn load_forest(&self) -> Result<Forest> {
        load_forest(&self.conn)
    }

    pub fn node_count(&self) -> Result<usize> {
        node_count(&self.conn)
    }

    pub fn history_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

/// One atomic unit of work against the store.
pub struct TreeTx<'a> {
    tx: Transaction<'a>,
}

impl TreeTx<'_> {
    pub fn load_forest(&self) -> Result<Forest> {
        load_forest(&self.tx)
    }

    pub fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        select_node(&self.tx, id)
    }

    pub fn child_ids(&self, id: NodeId) -> Result<Vec<NodeId>> {
        Ok(select_children(&self.tx, id)?
            .into_iter()
            .map(|node| node.id)
            .collect())
    }

    /// Insert or update the given nodes. Returns the number written.
    pub fn upsert_nodes<'n>(&self, nodes: impl IntoIterator<Item = &'n Node>) -> Result<usize> {
        let mut stmt = self.tx.prepare_cached(
            "INSERT INTO nodes (id, kind, url, size, parent_id, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                size = excluded.size,
                parent_id = excluded.parent_id,
                modified_at = excluded.modified_at",
        )?;
        let mut written = 0;
        for node in nodes {
            stmt.execute(params![
                node.id.to_string(),
                node.node_type().as_str(),
                node.kind.url(),
                node.kind.size().map(size_to_sql).transpose()?,
                node.parent_id.map(|id| id.to_string()),
                node.modified_at.to_storage(),
            ])?;
            written += 1;
        }
        Ok(written)
    }

    /// Most recent stored snapshot for each of `ids` that has any history.
    pub fn latest_snapshots(&self, ids: &[NodeId]) -> Result<HashMap<NodeId, HistorySnapshot>> {
        let mut stmt = self.tx.prepare_cached(&format!(
            "SELECT {HISTORY_COLUMNS} FROM history
             WHERE node_id = ?1 ORDER BY date DESC, id DESC LIMIT 1"
        ))?;
        let mut latest = HashMap::new();
        for id in ids {
            let row = stmt
                .query_row(params![id.to_string()], read_history_row)
                .optional()?;
            if let Some(row) = row {
                latest.insert(*id, row.into_record()?.snapshot);
            }
        }
        Ok(latest)
    }

    /// Append one snapshot. Returns its surrogate id.
    pub fn append_history(&self, node_id: NodeId, snapshot: &HistorySnapshot) -> Result<i64> {
        self.tx
            .prepare_cached(
                "INSERT INTO history (node_id, kind, url, size, parent_id, date)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?
            .execute(params![
                node_id.to_string(),
                snapshot.node_type.as_str(),
                snapshot.url,
                snapshot.size.map(size_to_sql).transpose()?,
                snapshot.parent_id.map(|id| id.to_string()),
                snapshot.date.to_storage(),
            ])?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Remove every history row of one node.
    pub fn delete_history_of(&self, id: NodeId) -> Result<usize> {
        Ok(self
            .tx
            .prepare_cached("DELETE FROM history WHERE node_id = ?1")?
            .execute(params![id.to_string()])?)
    }

    /// Remove one node row. Its children and history must already be gone.
    pub fn delete_node_row(&self, id: NodeId) -> Result<usize> {
        Ok(self
            .tx
            .prepare_cached("DELETE FROM nodes WHERE id = ?1")?
            .execute(params![id.to_string()])?)
    }

    /// Make every write of this unit durable and visible.
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

// ──────────────────── row types ────────────────────

/// Raw row of the `nodes` table.
#[derive(Debug, Clone)]
struct NodeRow {
    id: String,
    kind: String,
    url: Option<String>,
    size: Option<i64>,
    parent_id: Option<String>,
    modified_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<Node> {
        let id = parse_stored_id(&self.id)?;
        let size = self.size.map(size_from_sql).transpose()?;
        let kind = match NodeType::parse(&self.kind) {
            Some(NodeType::File) => NodeKind::File {
                url: self.url,
                size: size.ok_or_else(|| corrupt(format!("file {id} has no size")))?,
            },
            Some(NodeType::Folder) => NodeKind::Folder { size },
            None => return Err(corrupt(format!("node {id} has kind {:?}", self.kind))),
        };
        Ok(Node {
            id,
            parent_id: self.parent_id.as_deref().map(parse_stored_id).transpose()?,
            kind,
            modified_at: Timestamp::from_storage(&self.modified_at)?,
        })
    }
}

/// Raw row of the `history` table.
#[derive(Debug, Clone)]
struct HistoryRow {
    id: i64,
    node_id: String,
    kind: String,
    url: Option<String>,
    size: Option<i64>,
    parent_id: Option<String>,
    date: String,
}

impl HistoryRow {
    fn into_record(self) -> Result<HistoryRecord> {
        let node_id = parse_stored_id(&self.node_id)?;
        let node_type = NodeType::parse(&self.kind)
            .ok_or_else(|| corrupt(format!("history {} has kind {:?}", self.id, self.kind)))?;
        Ok(HistoryRecord {
            id: self.id,
            node_id,
            snapshot: HistorySnapshot {
                node_type,
                url: self.url,
                size: self.size.map(size_from_sql).transpose()?,
                parent_id: self.parent_id.as_deref().map(parse_stored_id).transpose()?,
                date: Timestamp::from_storage(&self.date)?,
            },
        })
    }
}

fn read_node_row(row: &Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        url: row.get(2)?,
        size: row.get(3)?,
        parent_id: row.get(4)?,
        modified_at: row.get(5)?,
    })
}

fn read_history_row(row: &Row<'_>) -> rusqlite::Result<HistoryRow> {
    Ok(HistoryRow {
        id: row.get(0)?,
        node_id: row.get(1)?,
        kind: row.get(2)?,
        url: row.get(3)?,
        size: row.get(4)?,
        parent_id: row.get(5)?,
        date: row.get(6)?,
    })
}

// ──────────────────── shared queries ────────────────────

fn select_node(conn: &Connection, id: NodeId) -> Result<Option<Node>> {
    let row = conn
        .prepare_cached(&format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"))?
        .query_row(params![id.to_string()], read_node_row)
        .optional()?;
    row.map(NodeRow::into_node).transpose()
}

fn select_children(conn: &Connection, id: NodeId) -> Result<Vec<Node>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {NODE_COLUMNS} FROM nodes WHERE parent_id = ?1 ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map(params![id.to_string()], read_node_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(NodeRow::into_node).collect()
}

fn load_forest(conn: &Connection) -> Result<Forest> {
    let mut stmt = conn.prepare_cached(&format!("SELECT {NODE_COLUMNS} FROM nodes"))?;
    let rows = stmt
        .query_map([], read_node_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let nodes = rows
        .into_iter()
        .map(NodeRow::into_node)
        .collect::<Result<Vec<_>>>()?;
    Ok(Forest::from_nodes(nodes))
}

fn node_count(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

fn parse_stored_id(raw: &str) -> Result<NodeId> {
    raw.parse()
        .map_err(|_| corrupt(format!("stored id {raw:?} is not a UUID")))
}

fn size_to_sql(size: u64) -> Result<i64> {
    i64::try_from(size)
        .map_err(|_| DtrError::validation(format!("size {size} does not fit a signed 64-bit column")))
}

fn size_from_sql(size: i64) -> Result<u64> {
    u64::try_from(size).map_err(|_| corrupt(format!("negative stored size {size}")))
}

fn corrupt(details: String) -> DtrError {
    DtrError::Serialization {
        context: "tree store row",
        details,
    }
}

// ──────────────────── schema & pragmas ────────────────────

fn apply_pragmas(conn: &Connection, file_backed: bool) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if !file_backed {
        return Ok(());
    }
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;
         PRAGMA temp_store = MEMORY;",
    )?;
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(%mode, "requested WAL journal mode but sqlite kept another");
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('FILE', 'FOLDER')),
            url TEXT,
            size INTEGER CHECK (size IS NULL OR size >= 0),
            parent_id TEXT REFERENCES nodes(id) DEFERRABLE INITIALLY DEFERRED,
            modified_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL REFERENCES nodes(id) DEFERRABLE INITIALLY DEFERRED,
            kind TEXT NOT NULL,
            url TEXT,
            size INTEGER,
            parent_id TEXT,
            date TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
        CREATE INDEX IF NOT EXISTS idx_nodes_kind_modified ON nodes(kind, modified_at);
        CREATE INDEX IF NOT EXISTS idx_history_node_date ON history(node_id, date);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────
