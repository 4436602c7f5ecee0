use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Card;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Success => "SUCCESS",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(TransactionStatus::Pending),
            "SUCCESS" => Some(TransactionStatus::Success),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    /// Whether the ledger accepts this status in an update-status call
    pub fn is_final(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Transaction {
    pub id: i64,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub amount: Decimal,
    pub currency: String,
    pub merchant_name: String,
    #[serde(default)]
    pub description: String,
    pub status: TransactionStatus,
    pub reference_id: String,
    #[serde(default)]
    pub failure_reason: String,
    pub card: Option<i64>,
    pub card_detail: Option<Card>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request body for `/api/transactions/create/`
#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
    pub card_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub merchant_name: String,
    pub description: String,
}

/// Request body for `/api/transactions/update-status/{reference_id}/`
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub status: TransactionStatus,
    pub failure_reason: String,
}

/// Query parameters for the signed-in user's transaction list. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub amount_min: Option<Decimal>,
    pub amount_max: Option<Decimal>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<u32>,
}

impl TransactionFilter {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(page) = self.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(status) = self.status {
            query.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(date) = self.date_from {
            query.push(("date_from".to_string(), date.format("%Y-%m-%d").to_string()));
        }
        if let Some(date) = self.date_to {
            query.push(("date_to".to_string(), date.format("%Y-%m-%d").to_string()));
        }
        if let Some(amount) = self.amount_min {
            query.push(("amount_min".to_string(), amount.to_string()));
        }
        if let Some(amount) = self.amount_max {
            query.push(("amount_max".to_string(), amount.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            query.push(("search".to_string(), search.to_string()));
        }
        if let Some(ordering) = self.ordering.as_deref().filter(|s| !s.is_empty()) {
            query.push(("ordering".to_string(), ordering.to_string()));
        }
        query
    }
}
