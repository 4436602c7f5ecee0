use crate::api::request::{Operation, PendingRequest};
use crate::api::{ApiClient, ApiError};
use crate::models::{PaymentReceipt, PaymentRequest, ServiceHealth};

/// Calls to the payment service. Authenticated with the same bearer token as
/// the ledger.
pub struct PaymentsApi<'a> {
    client: &'a ApiClient,
}

impl<'a> PaymentsApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub async fn process(&self, payment: &PaymentRequest) -> Result<PaymentReceipt, ApiError> {
        let request = PendingRequest::new(Operation::ProcessPayment).json(payment)?;
        self.client.send_json(request).await
    }

    pub async fn health(&self) -> Result<ServiceHealth, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::PaymentServiceHealth))
            .await
    }
}
