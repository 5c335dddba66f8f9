//! Structural validation of import batches.
//!
//! Pure checks on the raw request: identifier and date syntax, the per-kind
//! field rules, self-parenting, and duplicate ids inside one batch. Anything
//! that needs the stored tree (parent existence and type, cycles) is left to
//! the reconciler. The first violation fails the whole batch.

#![allow(missing_docs)]

use std::collections::HashSet;

use crate::core::errors::{DtrError, Result};
use crate::model::wire::{ImportRequest, NodeInput};
use crate::model::{NodeId, NodeKind, NodeType, Timestamp};

/// Longest URL accepted for a file.
pub const MAX_URL_LEN: usize = 255;

/// One upsert after validation: the kind-specific fields are carried by
/// construction in [`NodeKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeUpsert {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub kind: NodeKind,
}

/// A batch that passed every structural check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBatch {
    pub items: Vec<NodeUpsert>,
    pub timestamp: Timestamp,
}

impl ValidatedBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Validate a whole import request.
pub fn validate_batch(request: &ImportRequest) -> Result<ValidatedBatch> {
    let timestamp = Timestamp::parse(&request.update_date)?;
    let mut seen = HashSet::with_capacity(request.items.len());
    let mut items = Vec::with_capacity(request.items.len());
    for input in &request.items {
        let item = validate_item(input)?;
        if !seen.insert(item.id) {
            return Err(DtrError::validation(format!(
                "duplicate id {} within one batch",
                item.id
            )));
        }
        items.push(item);
    }
    Ok(ValidatedBatch { items, timestamp })
}

/// Validate a single raw item.
pub fn validate_item(input: &NodeInput) -> Result<NodeUpsert> {
    let id: NodeId = input.id.parse()?;
    let parent_id = input
        .parent_id
        .as_deref()
        .map(str::parse::<NodeId>)
        .transpose()?;

    if parent_id == Some(id) {
        return Err(DtrError::validation(format!(
            "node {id} cannot be its own parent"
        )));
    }

    let node_type = NodeType::parse(&input.node_type).ok_or_else(|| {
        DtrError::validation(format!(
            "node {id}: unknown type {:?} (expected FILE or FOLDER)",
            input.node_type
        ))
    })?;

    let kind = match node_type {
        NodeType::File => file_kind(id, input)?,
        NodeType::Folder => folder_kind(id, input)?,
    };

    Ok(NodeUpsert {
        id,
        parent_id,
        kind,
    })
}

fn file_kind(id: NodeId, input: &NodeInput) -> Result<NodeKind> {
    let raw_size = input
        .size
        .ok_or_else(|| DtrError::validation(format!("file {id}: size is required")))?;
    let size = u64::try_from(raw_size).map_err(|_| {
        DtrError::validation(format!("file {id}: size must be non-negative, got {raw_size}"))
    })?;

    if let Some(url) = &input.url {
        if !url.starts_with('/') {
            return Err(DtrError::validation(format!(
                "file {id}: url must start with '/', got {url:?}"
            )));
        }
        if url.chars().count() > MAX_URL_LEN {
            return Err(DtrError::validation(format!(
                "file {id}: url longer than {MAX_URL_LEN} characters"
            )));
        }
    }

    Ok(NodeKind::File {
        url: input.url.clone(),
        size,
    })
}

fn folder_kind(id: NodeId, input: &NodeInput) -> Result<NodeKind> {
    if input.size.is_some() {
        return Err(DtrError::validation(format!(
            "folder {id}: size must not be set"
        )));
    }
    if input.url.is_some() {
        return Err(DtrError::validation(format!(
            "folder {id}: url must not be set"
        )));
    }
    Ok(NodeKind::folder())
}
