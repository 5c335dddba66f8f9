//! Request and response payloads of the import/query surface.
//!
//! Inputs are kept loosely typed (strings, signed sizes) so that every shape
//! problem is reported by the validator as one batch-wide error instead of a
//! deserializer message.

use serde::{Deserialize, Serialize};

use crate::model::{HistoryRecord, Node, NodeId, NodeType, Timestamp};

/// Body of an import request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub items: Vec<NodeInput>,
    pub update_date: String,
}

/// One raw upsert inside an import request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInput {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<i64>,
}

impl NodeInput {
    pub fn folder(id: impl Into<String>, parent_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::Folder.as_str().to_string(),
            parent_id: parent_id.map(str::to_string),
            url: None,
            size: None,
        }
    }

    pub fn file(id: impl Into<String>, parent_id: Option<&str>, url: &str, size: i64) -> Self {
        Self {
            id: id.into(),
            node_type: NodeType::File.as_str().to_string(),
            parent_id: parent_id.map(str::to_string),
            url: Some(url.to_string()),
            size: Some(size),
        }
    }
}

/// A node as returned by point lookups and the recently-changed query.
///
/// `children` is `None` for files and a (possibly empty) list for folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeView {
    pub id: NodeId,
    pub url: Option<String>,
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub size: Option<u64>,
    pub date: Timestamp,
    pub children: Option<Vec<NodeView>>,
}

impl NodeView {
    /// Flat view: folders get an empty child list, files get none.
    #[must_use]
    pub fn leaf(node: &Node) -> Self {
        Self {
            id: node.id,
            url: node.kind.url().map(str::to_string),
            parent_id: node.parent_id,
            node_type: node.node_type(),
            size: node.kind.size(),
            date: node.modified_at,
            children: node.kind.is_folder().then(Vec::new),
        }
    }
}

/// A history record as returned by the history range query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: i64,
    pub node_id: NodeId,
    pub url: Option<String>,
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub size: Option<u64>,
    pub date: Timestamp,
}

impl From<&HistoryRecord> for HistoryItem {
    fn from(record: &HistoryRecord) -> Self {
        Self {
            id: record.id,
            node_id: record.node_id,
            url: record.snapshot.url.clone(),
            parent_id: record.snapshot.parent_id,
            node_type: record.snapshot.node_type,
            size: record.snapshot.size,
            date: record.snapshot.date,
        }
    }
}

/// `{"items": [...]}` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

/// `{"code": ..., "message": ...}` failure body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl ErrorBody {
    /// Body for a status code. Built per response; details stay in the logs.
    #[must_use]
    pub fn for_status(code: u16) -> Self {
        let message = match code {
            400 => "Validation Failed",
            404 => "Item not found",
            _ => "Internal Server Error",
        };
        Self {
            code,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeKind;

    #[test]
    fn import_request_accepts_original_payload_shape() {
        let raw = r#"{
            "items": [
                {"type": "FOLDER", "id": "069cb8d7-bbdd-47d3-ad8f-82ef4c269df1", "parentId": null},
                {"type": "FILE", "id": "863e1a7a-1304-42ae-943b-179184c077e3",
                 "parentId": "069cb8d7-bbdd-47d3-ad8f-82ef4c269df1", "url": "/file/url1", "size": 128}
            ],
            "updateDate": "2022-02-01T12:00:00Z"
        }"#;
        let req: ImportRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.items.len(), 2);
        assert_eq!(req.items[0].parent_id, None);
        assert_eq!(req.items[0].size, None);
        assert_eq!(req.items[1].size, Some(128));
        assert_eq!(req.update_date, "2022-02-01T12:00:00Z");
    }

    #[test]
    fn folder_view_serializes_children_list_and_null_size() {
        let node = Node {
            id: "069cb8d7-bbdd-47d3-ad8f-82ef4c269df1".parse().unwrap(),
            parent_id: None,
            kind: NodeKind::folder(),
            modified_at: Timestamp::parse("2022-02-01T12:00:00Z").unwrap(),
        };
        let value = serde_json::to_value(NodeView::leaf(&node)).unwrap();
        assert_eq!(value["type"], "FOLDER");
        assert_eq!(value["size"], serde_json::Value::Null);
        assert_eq!(value["parentId"], serde_json::Value::Null);
        assert_eq!(value["children"], serde_json::json!([]));
        assert_eq!(value["date"], "2022-02-01T12:00:00Z");
    }

    #[test]
    fn file_view_has_null_children() {
        let node = Node {
            id: NodeId::random(),
            parent_id: None,
            kind: NodeKind::File {
                url: Some("/f".to_string()),
                size: 3,
            },
            modified_at: Timestamp::now(),
        };
        let value = serde_json::to_value(NodeView::leaf(&node)).unwrap();
        assert_eq!(value["children"], serde_json::Value::Null);
        assert_eq!(value["url"], "/f");
    }

    #[test]
    fn error_bodies_are_fresh_per_call() {
        let mut first = ErrorBody::for_status(400);
        first.message.push_str(" (mutated)");
        assert_eq!(ErrorBody::for_status(400).message, "Validation Failed");
        assert_eq!(ErrorBody::for_status(404).message, "Item not found");
    }
}
