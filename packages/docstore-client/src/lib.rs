//! Pure document store REST API client.
//!
//! A minimal client for the schemaless document store that backs each
//! deployment environment. Supports table description, paginated scans,
//! conditional (only-if-absent) puts, point reads and deletes.
//!
//! # Example
//!
//! ```rust,ignore
//! use docstore_client::{DocStoreClient, ScanInput};
//!
//! let client = DocStoreClient::new("https://store.staging.internal".into(), "token".into());
//!
//! let page = client.scan("Contacts-staging", &ScanInput::default()).await?;
//! for item in &page.items {
//!     println!("{:?}", item.get("id"));
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{DocStoreError, Result};
pub use types::{Document, PutStatus, ScanInput, ScanOutput, TableInfo};

use reqwest::{Response, StatusCode};

#[derive(Debug, Clone)]
pub struct DocStoreClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl DocStoreClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, token)
    }

    /// Use a preconfigured reqwest client (custom timeouts, proxies).
    pub fn with_http_client(client: reqwest::Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/tables/{}", self.base_url, urlencoding::encode(table))
    }

    fn item_url(&self, table: &str, id: &str) -> String {
        format!("{}/items/{}", self.table_url(table), urlencoding::encode(id))
    }

    /// Describe a table. Returns `None` when the table does not exist.
    pub async fn describe_table(&self, table: &str) -> Result<Option<TableInfo>> {
        let resp = self
            .client
            .get(self.table_url(table))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp).await?;
        Ok(Some(resp.json().await?))
    }

    /// Fetch one page of items.
    pub async fn scan(&self, table: &str, input: &ScanInput) -> Result<ScanOutput> {
        let url = format!("{}/scan", self.table_url(table));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let resp = ensure_success(resp).await?;
        let page: ScanOutput = resp.json().await?;
        tracing::debug!(
            table,
            items = page.items.len(),
            has_more = page.next_page_token.is_some(),
            "Scanned page"
        );
        Ok(page)
    }

    /// Write a document only if no document with `id` exists yet.
    pub async fn put_if_absent(&self, table: &str, id: &str, item: &Document) -> Result<PutStatus> {
        let url = format!("{}?ifAbsent=true", self.item_url(table, id));
        let resp = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .json(item)
            .send()
            .await?;

        if resp.status() == StatusCode::CONFLICT {
            return Ok(PutStatus::Conflict);
        }
        ensure_success(resp).await?;
        Ok(PutStatus::Created)
    }

    /// Read a single document by id.
    pub async fn get_item(&self, table: &str, id: &str) -> Result<Option<Document>> {
        let resp = self
            .client
            .get(self.item_url(table, id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp).await?;
        Ok(Some(resp.json().await?))
    }

    /// Delete a document by id. Deleting a missing document is not an error.
    pub async fn delete_item(&self, table: &str, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.item_url(table, id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        ensure_success(resp).await?;
        Ok(())
    }
}

async fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DocStoreError::Api {
        status: status.as_u16(),
        message: body,
    })
}
