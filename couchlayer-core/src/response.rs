//! Store response shapes.
//!
//! These mirror the JSON bodies a CouchDB server returns so transports can deserialize into them
//! directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Acknowledgement of a single-document write or removal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub rev: String,
}

/// Result of a selector query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindResponse {
    #[serde(default)]
    pub docs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// One row of an `_all_docs` or view read.
///
/// Rows requested by an explicit key that does not exist carry `error` instead of `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub key: Value,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Row {
    /// Converts the row back to its raw JSON form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result of an `_all_docs` or view read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowsResponse {
    #[serde(default)]
    pub total_rows: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl RowsResponse {
    /// The embedded documents, in row order. Rows without a document are skipped.
    pub fn docs(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.doc.clone())
            .collect()
    }

    pub fn into_docs(self) -> Vec<Value> {
        self.rows
            .into_iter()
            .filter_map(|row| row.doc)
            .collect()
    }
}

/// Per-document outcome of a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BulkResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Database metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbInfo {
    pub db_name: String,
    #[serde(default)]
    pub doc_count: u64,
    #[serde(default)]
    pub doc_del_count: u64,
    #[serde(default)]
    pub update_seq: Value,
}
