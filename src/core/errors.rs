//! DTR-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::NodeId;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, DtrError>;

/// Top-level error type for the tree engine.
#[derive(Debug, Error)]
pub enum DtrError {
    #[error("[DTR-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[DTR-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[DTR-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[DTR-2001] malformed input: {details}")]
    MalformedInput { details: String },

    #[error("[DTR-2002] validation failed: {details}")]
    ValidationFailed { details: String },

    #[error("[DTR-2003] node {id} references unknown parent {parent_id}")]
    UnresolvedParent { id: NodeId, parent_id: NodeId },

    #[error("[DTR-2004] node {id} references parent {parent_id}, which is not a folder")]
    InvalidParentType { id: NodeId, parent_id: NodeId },

    #[error("[DTR-2005] node {id} cannot be placed under its own descendant {parent_id}")]
    CyclicParent { id: NodeId, parent_id: NodeId },

    #[error("[DTR-2006] node {id} is stored as {stored} and cannot become {requested}")]
    ImmutableKindViolation {
        id: NodeId,
        stored: &'static str,
        requested: &'static str,
    },

    #[error("[DTR-2101] node not found: {id}")]
    NotFound { id: NodeId },

    #[error("[DTR-3001] cycle detected in stored tree: {details}")]
    CycleDetected { details: String },

    #[error("[DTR-3101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[DTR-3102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[DTR-3103] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[DTR-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl DtrError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "DTR-1001",
            Self::MissingConfig { .. } => "DTR-1002",
            Self::ConfigParse { .. } => "DTR-1003",
            Self::MalformedInput { .. } => "DTR-2001",
            Self::ValidationFailed { .. } => "DTR-2002",
            Self::UnresolvedParent { .. } => "DTR-2003",
            Self::InvalidParentType { .. } => "DTR-2004",
            Self::CyclicParent { .. } => "DTR-2005",
            Self::ImmutableKindViolation { .. } => "DTR-2006",
            Self::NotFound { .. } => "DTR-2101",
            Self::CycleDetected { .. } => "DTR-3001",
            Self::Serialization { .. } => "DTR-3101",
            Self::Sql { .. } => "DTR-3102",
            Self::Io { .. } => "DTR-3103",
            Self::Runtime { .. } => "DTR-3900",
        }
    }

    /// Whether the failure was caused by the caller's request rather than the engine.
    ///
    /// Every such error aborts the batch before anything is committed.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput { .. }
                | Self::ValidationFailed { .. }
                | Self::UnresolvedParent { .. }
                | Self::InvalidParentType { .. }
                | Self::CyclicParent { .. }
                | Self::ImmutableKindViolation { .. }
        )
    }

    /// HTTP status equivalent for the external request/response surface.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        if self.is_input_error() {
            return 400;
        }
        match self {
            Self::NotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for batch-level validation failures.
    #[must_use]
    pub fn validation(details: impl Into<String>) -> Self {
        Self::ValidationFailed {
            details: details.into(),
        }
    }

    /// Convenience constructor for unparseable ids, dates, or payload shapes.
    #[must_use]
    pub fn malformed(details: impl Into<String>) -> Self {
        Self::MalformedInput {
            details: details.into(),
        }
    }
}

impl From<rusqlite::Error> for DtrError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for DtrError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for DtrError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
