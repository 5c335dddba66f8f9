#![forbid(unsafe_code)]

//! disk_tree (dtr) — a forest of files and folders whose folder sizes and
//! modification times are kept consistent with their descendants after every
//! import batch, with an append-only history of every state change.
//!
//! Pipeline for one batch:
//! 1. **Validator** — structural checks on the raw request
//! 2. **Reconciler** — parent resolution, kind stability, cycle rejection, upsert
//! 3. **Timestamp propagation** — batch time stamped up every touched chain
//! 4. **Aggregator** — bottom-up folder size recomputation
//! 5. **History recorder** — snapshots of every node stamped by the batch
//!
//! All five stages run over an in-memory arena inside one SQLite transaction.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use disk_tree::prelude::*;
//!
//! # fn main() -> disk_tree::core::errors::Result<()> {
//! let service = TreeService::new(TreeStore::open_in_memory()?, HistoryPolicy::default());
//! let root = NodeId::random();
//! service.import(&ImportRequest {
//!     items: vec![NodeInput::folder(root.to_string(), None)],
//!     update_date: "2022-02-01T12:00:00Z".to_string(),
//! })?;
//! let view = service.get_node(root)?;
//! assert_eq!(view.children, Some(Vec::new()));
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod core;
pub mod logger;
pub mod model;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod tree;
