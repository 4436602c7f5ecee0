//! Pay with a saved card and record the outcome on the ledger.
//!
//! The payment service decides the outcome; the ledger only keeps the record.
//! Once the payment service has answered, the charge has happened, so any
//! later ledger failure is reported together with the receipt.

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{NewTransaction, PaymentReceipt, PaymentRequest, StatusUpdate, Transaction};

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Payment failed: {0}")]
    Payment(#[source] ApiError),

    #[error("Payment {} was processed but could not be recorded: {source}", receipt.reference_id)]
    LedgerSync {
        receipt: PaymentReceipt,
        #[source]
        source: ApiError,
    },
}

impl CheckoutError {
    /// Receipt of a payment that went through despite the error
    pub fn receipt(&self) -> Option<&PaymentReceipt> {
        match self {
            CheckoutError::Payment(_) => None,
            CheckoutError::LedgerSync { receipt, .. } => Some(receipt),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub receipt: PaymentReceipt,
    pub transaction: Transaction,
}

pub struct Checkout<'a> {
    client: &'a ApiClient,
}

impl<'a> Checkout<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Process the payment, create the ledger record, then push the result.
    pub async fn pay(&self, request: &PaymentRequest) -> Result<CheckoutOutcome, CheckoutError> {
        let receipt = self
            .client
            .payments()
            .process(request)
            .await
            .map_err(CheckoutError::Payment)?;
        info!(
            reference_id = %receipt.reference_id,
            status = receipt.status.as_str(),
            "Payment processed"
        );

        match self.record(request, &receipt).await {
            Ok(transaction) => Ok(CheckoutOutcome {
                receipt,
                transaction,
            }),
            Err(source) => {
                warn!(
                    reference_id = %receipt.reference_id,
                    error = %source,
                    "Payment processed but ledger update failed"
                );
                Err(CheckoutError::LedgerSync { receipt, source })
            }
        }
    }

    async fn record(
        &self,
        request: &PaymentRequest,
        receipt: &PaymentReceipt,
    ) -> Result<Transaction, ApiError> {
        let created = self
            .client
            .transactions()
            .create(&NewTransaction {
                card_id: request.card_id,
                amount: request.amount,
                currency: request.currency.clone(),
                merchant_name: request.merchant_name.clone(),
                description: request.description.clone(),
            })
            .await?;

        // A still-pending result stays as created
        if !receipt.status.is_final() {
            return Ok(created);
        }

        let update = StatusUpdate {
            status: receipt.status,
            failure_reason: receipt.failure_reason().to_string(),
        };
        // The ledger keys the record by its own reference, not the receipt's
        self.client
            .transactions()
            .update_status(&created.reference_id, &update)
            .await
    }
}
