//! Domain model: node identifiers, timestamps, nodes, history snapshots, and
//! the wire shapes of the request/response surface.

pub mod history;
pub mod id;
pub mod node;
pub mod timestamp;
pub mod wire;

pub use history::{HistoryRecord, HistorySnapshot};
pub use id::NodeId;
pub use node::{Node, NodeKind, NodeType};
pub use timestamp::Timestamp;
