use crate::api::request::{Operation, PendingRequest};
use crate::api::{ApiClient, ApiError};
use crate::models::{NewTransaction, Page, StatusUpdate, Transaction, TransactionFilter};

pub struct TransactionsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> TransactionsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// One page of the signed-in user's transactions
    pub async fn list(&self, filter: &TransactionFilter) -> Result<Page<Transaction>, ApiError> {
        let request = PendingRequest::new(Operation::ListTransactions).query(filter.to_query());
        self.client.send_json(request).await
    }

    /// Record a new PENDING transaction on the ledger
    pub async fn create(&self, transaction: &NewTransaction) -> Result<Transaction, ApiError> {
        let request = PendingRequest::new(Operation::CreateTransaction).json(transaction)?;
        self.client.send_json(request).await
    }

    pub async fn detail(&self, id: i64) -> Result<Transaction, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::TransactionDetail(id)))
            .await
    }

    pub async fn update_status(
        &self,
        reference_id: &str,
        update: &StatusUpdate,
    ) -> Result<Transaction, ApiError> {
        let request =
            PendingRequest::new(Operation::UpdateTransactionStatus(reference_id.to_string()))
                .json(update)?;
        self.client.send_json(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::auth::{MemoryStore, TokenPair};
    use crate::config::Config;
    use crate::models::TransactionStatus;

    fn client_for(server: &MockServer) -> ApiClient {
        ApiClient::new(
            &Config::for_base_urls(server.base_url(), server.base_url()),
            Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1"))),
        )
        .unwrap()
    }

    fn transaction_json(id: i64, status: &str) -> serde_json::Value {
        json!({"id": id, "amount": "25.00", "currency": "USD", "merchant_name": "Cafe",
               "description": "", "status": status, "reference_id": format!("REF{}", id),
               "failure_reason": "", "card": 1, "card_detail": null,
               "created_at": "2025-03-02T08:00:00Z", "updated_at": null})
    }

    #[tokio::test]
    async fn test_list_sends_filters() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/transactions/")
                    .query_param("status", "FAILED")
                    .query_param("search", "cafe");
                then.status(200).json_body(json!({
                    "count": 1, "next": null, "previous": null,
                    "results": [transaction_json(4, "FAILED")]
                }));
            })
            .await;

        let filter = TransactionFilter {
            status: Some(TransactionStatus::Failed),
            search: Some("cafe".into()),
            ..Default::default()
        };
        let page = client_for(&server).transactions().list(&filter).await.unwrap();

        assert_eq!(page.count, 1);
        assert!(!page.has_next());
        assert_eq!(page.results[0].status, TransactionStatus::Failed);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_update_status_targets_reference() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/api/transactions/update-status/REF9/")
                    .json_body(json!({"status": "SUCCESS", "failure_reason": ""}));
                then.status(200).json_body(transaction_json(9, "SUCCESS"));
            })
            .await;

        let update = StatusUpdate {
            status: TransactionStatus::Success,
            failure_reason: String::new(),
        };
        let transaction = client_for(&server)
            .transactions()
            .update_status("REF9", &update)
            .await
            .unwrap();

        assert_eq!(transaction.reference_id, "REF9");
        mock.assert_async().await;
    }
}
