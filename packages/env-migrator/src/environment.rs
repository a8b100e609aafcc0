//! A deployment environment: a named store plus its physical table naming.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{DocumentStore, Item, PutOutcome, ScanPage, ScanRequest, TableDescription};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);

/// How logical table names map to physical ones in an environment,
/// e.g. `Contacts` -> `Contacts-equsgef6fbgdhd4pnzv3xbivmm-NONE`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNaming {
    pub prefix: String,
    pub suffix: String,
}

impl TableNaming {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn physical(&self, logical: &str) -> String {
        format!("{}{}{}", self.prefix, logical, self.suffix)
    }
}

/// Every store call made by the engine goes through here, so each one is
/// bounded by `timeout` and addressed by physical table name.
#[derive(Clone)]
pub struct Environment {
    name: String,
    store: Arc<dyn DocumentStore>,
    naming: TableNaming,
    timeout: Duration,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("naming", &self.naming)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Environment {
    pub fn new(name: impl Into<String>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            name: name.into(),
            store,
            naming: TableNaming::default(),
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_naming(mut self, naming: TableNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn physical_table(&self, table: &str) -> String {
        self.naming.physical(table)
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    pub async fn describe(&self, table: &str) -> Result<TableDescription, StoreError> {
        let physical = self.physical_table(table);
        self.bounded(self.store.describe(&physical)).await
    }

    pub async fn scan(&self, table: &str, request: ScanRequest) -> Result<ScanPage, StoreError> {
        let physical = self.physical_table(table);
        self.bounded(self.store.scan(&physical, request)).await
    }

    pub async fn put_if_absent(
        &self,
        table: &str,
        id: &str,
        item: &Item,
    ) -> Result<PutOutcome, StoreError> {
        let physical = self.physical_table(table);
        self.bounded(self.store.put_if_absent(&physical, id, item))
            .await
    }

    pub async fn get(&self, table: &str, id: &str) -> Result<Option<Item>, StoreError> {
        let physical = self.physical_table(table);
        self.bounded(self.store.get(&physical, id)).await
    }

    pub async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let physical = self.physical_table(table);
        self.bounded(self.store.delete(&physical, id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    #[test]
    fn physical_names_wrap_logical_name() {
        let naming = TableNaming::new("RealTechee-", "-abc-NONE");
        assert_eq!(naming.physical("Contacts"), "RealTechee-Contacts-abc-NONE");
        assert_eq!(TableNaming::default().physical("Contacts"), "Contacts");
    }

    #[tokio::test]
    async fn calls_use_physical_table_names() {
        let store = Arc::new(InMemoryStore::new().with_tables(["Contacts-prod"]));
        let env = Environment::new("prod", store).with_naming(TableNaming::new("", "-prod"));
        assert!(env.describe("Contacts").await.unwrap().exists);
        assert!(!env.describe("Projects").await.unwrap().exists);
    }

    struct HangingStore;

    #[async_trait]
    impl DocumentStore for HangingStore {
        async fn describe(&self, _: &str) -> Result<TableDescription, StoreError> {
            std::future::pending().await
        }
        async fn scan(&self, _: &str, _: ScanRequest) -> Result<ScanPage, StoreError> {
            std::future::pending().await
        }
        async fn put_if_absent(&self, _: &str, _: &str, _: &Item) -> Result<PutOutcome, StoreError> {
            std::future::pending().await
        }
        async fn get(&self, _: &str, _: &str) -> Result<Option<Item>, StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str, _: &str) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hung_calls_time_out() {
        let env = Environment::new("dev", Arc::new(HangingStore))
            .with_timeout(Duration::from_millis(20));
        let err = env.put_if_absent("T", "1", &Item::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
    }
}
