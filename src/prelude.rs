//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use disk_tree::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DtrError, Result};

// Model
pub use crate::model::wire::{HistoryItem, ImportRequest, NodeInput, NodeView};
pub use crate::model::{HistoryRecord, Node, NodeId, NodeKind, NodeType, Timestamp};

// Engine
pub use crate::store::TreeStore;
pub use crate::tree::history::HistoryPolicy;
pub use crate::tree::{DeleteReport, ImportReport, TreeService};

// Activity log
pub use crate::logger::ActivityLog;
