use crate::api::request::{Operation, PendingRequest};
use crate::api::{ApiClient, ApiError};
use crate::models::{
    AdminLogEntry, AdminTransactionFilter, Card, DailySummaryRow, Page, Transaction, UserProfile,
    UserUpdate,
};

const CSV_ACCEPT: &str = "text/csv";

/// Admin panel endpoints. The ledger answers 403 for non-admin accounts.
pub struct AdminApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AdminApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn users(&self) -> Result<Page<UserProfile>, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::AdminUsers))
            .await
    }

    pub async fn user(&self, id: i64) -> Result<UserProfile, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::AdminUser(id)))
            .await
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> Result<UserProfile, ApiError> {
        let request = PendingRequest::new(Operation::AdminUpdateUser(id)).json(update)?;
        self.client.send_json(request).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), ApiError> {
        self.client
            .send_empty(PendingRequest::new(Operation::AdminDeleteUser(id)))
            .await
    }

    pub async fn cards(&self) -> Result<Page<Card>, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::AdminCards))
            .await
    }

    /// All users' transactions. `filter.user_id` narrows to one account.
    pub async fn transactions(
        &self,
        filter: &AdminTransactionFilter,
    ) -> Result<Page<Transaction>, ApiError> {
        let request = PendingRequest::new(Operation::AdminTransactions).query(filter.to_query());
        self.client.send_json(request).await
    }

    pub async fn daily_summary(&self) -> Result<Vec<DailySummaryRow>, ApiError> {
        let page: Page<DailySummaryRow> = self
            .client
            .send_json(PendingRequest::new(Operation::AdminDailySummary))
            .await?;
        Ok(page.into_vec())
    }

    /// Every transaction as CSV, bytes exactly as the ledger sent them
    pub async fn export_csv(&self) -> Result<Vec<u8>, ApiError> {
        let request = PendingRequest::new(Operation::AdminExportCsv).accept(CSV_ACCEPT);
        self.client.send_bytes(request).await
    }

    pub async fn logs(&self) -> Result<Page<AdminLogEntry>, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::AdminLogs))
            .await
    }
}
