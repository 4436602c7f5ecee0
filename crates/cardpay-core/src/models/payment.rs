use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TransactionStatus;

/// Charge request for the payment service
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub card_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub merchant_name: String,
    pub description: String,
}

/// Outcome reported by the payment service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PaymentReceipt {
    pub reference_id: String,
    pub status: TransactionStatus,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub amount: Decimal,
    pub currency: String,
    pub merchant_name: String,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub processed_at: String,
    pub card_id: i64,
    pub user_id: String,
}

impl PaymentReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    pub fn failure_reason(&self) -> &str {
        self.failure_reason.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub service: Option<String>,
    pub version: Option<String>,
}
