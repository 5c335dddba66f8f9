//! Nodes of the forest and their immutable kind.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{NodeId, Timestamp};

/// Discriminant of [`NodeKind`], as spelled on the wire and in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    File,
    Folder,
}

impl NodeType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "FILE",
            Self::Folder => "FOLDER",
        }
    }

    /// Exact, case-sensitive match against the wire spelling.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "FILE" => Some(Self::File),
            "FOLDER" => Some(Self::Folder),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload. Only files carry a URL, and a file always has a size;
/// a folder's size is derived and absent while it has no file descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    File { url: Option<String>, size: u64 },
    Folder { size: Option<u64> },
}

impl NodeKind {
    /// An empty folder, before aggregation has run.
    #[must_use]
    pub const fn folder() -> Self {
        Self::Folder { size: None }
    }

    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::File { .. } => NodeType::File,
            Self::Folder { .. } => NodeType::Folder,
        }
    }

    #[must_use]
    pub const fn is_folder(&self) -> bool {
        matches!(self, Self::Folder { .. })
    }

    #[must_use]
    pub const fn size(&self) -> Option<u64> {
        match self {
            Self::File { size, .. } => Some(*size),
            Self::Folder { size } => *size,
        }
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::File { url, .. } => url.as_deref(),
            Self::Folder { .. } => None,
        }
    }
}

/// One file or folder in the forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub kind: NodeKind,
    /// Most recent state change to this node or any of its descendants.
    pub modified_at: Timestamp,
}

impl Node {
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
