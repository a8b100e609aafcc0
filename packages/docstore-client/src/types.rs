use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document. The store is schemaless, so this is a plain JSON object.
pub type Document = Map<String, Value>;

/// Table metadata returned by `GET /tables/{table}`.
#[derive(Debug, Clone, Deserialize)]
pub struct TableInfo {
    #[serde(rename = "itemCount", default)]
    pub item_count: u64,
}

/// Body for `POST /tables/{table}/scan`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(rename = "pageToken", skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// One page of scan results.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanOutput {
    #[serde(default)]
    pub items: Vec<Document>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

/// Outcome of a conditional put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Created,
    /// 409: a document with this id already exists
    Conflict,
}
