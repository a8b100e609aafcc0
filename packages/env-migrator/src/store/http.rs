use async_trait::async_trait;
use docstore_client::{DocStoreClient, DocStoreError, PutStatus, ScanInput};

use super::{DocumentStore, Item, PutOutcome, ScanPage, ScanRequest, TableDescription};
use crate::error::StoreError;

/// `DocumentStore` backed by the document store REST API.
pub struct HttpDocumentStore {
    client: DocStoreClient,
}

impl HttpDocumentStore {
    pub fn new(client: DocStoreClient) -> Self {
        Self { client }
    }
}

impl From<DocStoreError> for StoreError {
    fn from(err: DocStoreError) -> Self {
        if err.is_connect() {
            return StoreError::Unavailable(err.to_string());
        }
        match err {
            DocStoreError::Api { status, message } => StoreError::Rejected { status, message },
            DocStoreError::Http(e) if e.is_decode() => StoreError::Malformed(e.to_string()),
            DocStoreError::Http(e) => match e.status() {
                Some(status) => StoreError::Rejected {
                    status: status.as_u16(),
                    message: e.to_string(),
                },
                None => StoreError::Unavailable(e.to_string()),
            },
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn describe(&self, table: &str) -> Result<TableDescription, StoreError> {
        Ok(match self.client.describe_table(table).await? {
            Some(info) => TableDescription::present(info.item_count),
            None => TableDescription::missing(),
        })
    }

    async fn scan(&self, table: &str, request: ScanRequest) -> Result<ScanPage, StoreError> {
        let input = ScanInput {
            limit: request.limit,
            page_token: request.page_token,
        };
        let page = self.client.scan(table, &input).await?;
        Ok(ScanPage {
            items: page.items,
            next_page_token: page.next_page_token,
        })
    }

    async fn put_if_absent(
        &self,
        table: &str,
        id: &str,
        item: &Item,
    ) -> Result<PutOutcome, StoreError> {
        Ok(match self.client.put_if_absent(table, id, item).await? {
            PutStatus::Created => PutOutcome::Written,
            PutStatus::Conflict => PutOutcome::AlreadyExists,
        })
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Item>, StoreError> {
        Ok(self.client.get_item(table, id).await?)
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        Ok(self.client.delete_item(table, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_keep_status() {
        let err: StoreError = DocStoreError::Api {
            status: 403,
            message: "forbidden".into(),
        }
        .into();
        assert!(matches!(err, StoreError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn refused_connections_are_unavailable() {
        // Nothing listens on port 1.
        let store = HttpDocumentStore::new(DocStoreClient::new(
            "http://127.0.0.1:1".to_string(),
            "token".to_string(),
        ));

        let err = store.describe("Contacts").await.unwrap_err();

        assert!(matches!(err, StoreError::Unavailable(_)), "{:?}", err);
    }
}
