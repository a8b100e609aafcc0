//! Document store seam.
//!
//! The engine never talks to a store directly: everything goes through the
//! `DocumentStore` trait, wrapped by an [`Environment`](crate::environment::Environment)
//! that adds table naming and timeouts.

pub mod http;
pub mod memory;

pub use http::HttpDocumentStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A schemaless record.
pub type Item = Map<String, Value>;

/// Result of a describe call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDescription {
    pub exists: bool,
    pub approx_item_count: u64,
}

impl TableDescription {
    pub fn missing() -> Self {
        Self {
            exists: false,
            approx_item_count: 0,
        }
    }

    pub fn present(approx_item_count: u64) -> Self {
        Self {
            exists: true,
            approx_item_count,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    /// Maximum items in the returned page
    pub limit: Option<usize>,
    /// Continuation token from the previous page
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    pub next_page_token: Option<String>,
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// A record with this identity was already present; nothing was written
    AlreadyExists,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn describe(&self, table: &str) -> Result<TableDescription, StoreError>;

    async fn scan(&self, table: &str, request: ScanRequest) -> Result<ScanPage, StoreError>;

    /// Write `item` only if no record keyed `id` exists.
    async fn put_if_absent(&self, table: &str, id: &str, item: &Item)
        -> Result<PutOutcome, StoreError>;

    async fn get(&self, table: &str, id: &str) -> Result<Option<Item>, StoreError>;

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError>;
}

/// Render a scalar JSON value as a record key.
///
/// Strings are used as-is and numbers by their decimal form. Null, booleans,
/// arrays and objects are not keys.
pub fn scalar_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_key_accepts_strings_and_numbers_only() {
        assert_eq!(scalar_key(&json!("abc")), Some("abc".to_string()));
        assert_eq!(scalar_key(&json!(42)), Some("42".to_string()));
        assert_eq!(scalar_key(&json!("")), None);
        assert_eq!(scalar_key(&json!(null)), None);
        assert_eq!(scalar_key(&json!(true)), None);
        assert_eq!(scalar_key(&json!({"id": 1})), None);
    }
}
