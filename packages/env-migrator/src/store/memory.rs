//! Process-local document store.
//!
//! Used by the test suite and for rehearsing a run without a network store.
//! Supports scripted failures so fatal paths (write errors, unreachable
//! environments, failing deletes) can be exercised deterministically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{DocumentStore, Item, PutOutcome, ScanPage, ScanRequest, TableDescription};
use crate::error::StoreError;

/// Page size used when a scan does not ask for one.
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    tables: BTreeMap<String, BTreeMap<String, Item>>,
    /// Remaining successful puts per table before puts start failing
    put_budgets: HashMap<String, usize>,
    failing_deletes: HashSet<String>,
    unreachable: bool,
    writes: usize,
    deletes: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an empty table (no-op if it already exists).
    pub fn create_table(&self, table: &str) {
        self.lock().tables.entry(table.to_string()).or_default();
    }

    pub fn with_tables<'a>(self, tables: impl IntoIterator<Item = &'a str>) -> Self {
        for table in tables {
            self.create_table(table);
        }
        self
    }

    /// Seed a record directly, bypassing conditional-write semantics.
    pub fn insert(&self, table: &str, id: &str, item: Item) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), item);
    }

    pub fn items(&self, table: &str) -> Vec<Item> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ids(&self, table: &str) -> Vec<String> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.len())
    }

    /// Allow `successful` more puts into `table`, then fail every later put
    /// with a non-conflict error.
    pub fn fail_puts_after(&self, table: &str, successful: usize) {
        self.lock().put_budgets.insert(table.to_string(), successful);
    }

    pub fn fail_deletes_for(&self, table: &str) {
        self.lock().failing_deletes.insert(table.to_string());
    }

    /// Drop every scripted put and delete failure.
    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.put_budgets.clear();
        inner.failing_deletes.clear();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Number of successful puts and deletes served so far.
    pub fn mutation_count(&self) -> usize {
        let inner = self.lock();
        inner.writes + inner.deletes
    }

    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }
}

impl Inner {
    fn reachable(&self) -> Result<(), StoreError> {
        if self.unreachable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }

    fn table(&self, table: &str) -> Result<&BTreeMap<String, Item>, StoreError> {
        self.tables.get(table).ok_or_else(|| not_found(table))
    }
}

fn not_found(table: &str) -> StoreError {
    StoreError::Rejected {
        status: 404,
        message: format!("table {} not found", table),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn describe(&self, table: &str) -> Result<TableDescription, StoreError> {
        let inner = self.lock();
        inner.reachable()?;
        Ok(match inner.tables.get(table) {
            Some(t) => TableDescription::present(t.len() as u64),
            None => TableDescription::missing(),
        })
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> Result<ScanPage, StoreError> {
        let inner = self.lock();
        inner.reachable()?;
        let rows = inner.table(table)?;
        let page_size = request.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);

        let remaining: Vec<(&String, &Item)> = match &request.page_token {
            Some(after) => rows
                .range::<String, _>((
                    std::ops::Bound::Excluded(after),
                    std::ops::Bound::Unbounded,
                ))
                .collect(),
            None => rows.iter().collect(),
        };

        let items: Vec<Item> = remaining
            .iter()
            .take(page_size)
            .map(|(_, item)| (*item).clone())
            .collect();
        let next_page_token = if remaining.len() > page_size {
            remaining.get(page_size - 1).map(|(id, _)| (*id).clone())
        } else {
            None
        };

        Ok(ScanPage {
            items,
            next_page_token,
        })
    }

    async fn put_if_absent(
        &self,
        table: &str,
        id: &str,
        item: &Item,
    ) -> Result<PutOutcome, StoreError> {
        let mut inner = self.lock();
        inner.reachable()?;
        if !inner.tables.contains_key(table) {
            return Err(not_found(table));
        }
        if inner.tables.get(table).is_some_and(|t| t.contains_key(id)) {
            return Ok(PutOutcome::AlreadyExists);
        }
        if let Some(budget) = inner.put_budgets.get_mut(table) {
            if *budget == 0 {
                return Err(StoreError::Rejected {
                    status: 500,
                    message: "internal server error".into(),
                });
            }
            *budget -= 1;
        }

        inner
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), item.clone());
        inner.writes += 1;
        Ok(PutOutcome::Written)
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Item>, StoreError> {
        let inner = self.lock();
        inner.reachable()?;
        Ok(inner.table(table)?.get(id).cloned())
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.reachable()?;
        if inner.failing_deletes.contains(table) {
            return Err(StoreError::Rejected {
                status: 503,
                message: "throttled".into(),
            });
        }
        let removed = inner
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found(table))?
            .remove(id);
        if removed.is_some() {
            inner.deletes += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(id: &str) -> Item {
        json!({ "id": id }).as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn scan_paginates_in_id_order() {
        let store = InMemoryStore::new();
        for id in ["c", "a", "e", "b", "d"] {
            store.insert("T", id, item(id));
        }

        let first = store
            .scan("T", ScanRequest { limit: Some(2), page_token: None })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_page_token.as_deref(), Some("b"));

        let second = store
            .scan("T", ScanRequest { limit: Some(2), page_token: first.next_page_token })
            .await
            .unwrap();
        assert_eq!(second.items[0]["id"], json!("c"));

        let last = store
            .scan("T", ScanRequest { limit: Some(2), page_token: second.next_page_token })
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(last.next_page_token.is_none());
    }

    #[tokio::test]
    async fn conditional_put_reports_conflict() {
        let store = InMemoryStore::new().with_tables(["T"]);
        assert_eq!(store.put_if_absent("T", "1", &item("1")).await.unwrap(), PutOutcome::Written);
        assert_eq!(
            store.put_if_absent("T", "1", &item("1")).await.unwrap(),
            PutOutcome::AlreadyExists
        );
        assert_eq!(store.count("T"), 1);
    }

    #[tokio::test]
    async fn put_budget_turns_into_failures() {
        let store = InMemoryStore::new().with_tables(["T"]);
        store.fail_puts_after("T", 1);
        assert!(store.put_if_absent("T", "1", &item("1")).await.is_ok());
        let err = store.put_if_absent("T", "2", &item("2")).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 500, .. }));
    }

    #[tokio::test]
    async fn describe_missing_table() {
        let store = InMemoryStore::new();
        assert!(!store.describe("Nope").await.unwrap().exists);
        store.set_unreachable(true);
        assert!(matches!(store.describe("Nope").await, Err(StoreError::Unavailable(_))));
    }
}
