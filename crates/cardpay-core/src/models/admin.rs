use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::TransactionStatus;

/// Audit entry written by the ledger for every admin action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminLogEntry {
    pub id: i64,
    pub admin: Option<String>,
    pub action: String,
    pub target_model: String,
    #[serde(default)]
    pub target_id: String,
    #[serde(default)]
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

/// One (day, status) bucket of the daily summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    pub date: NaiveDate,
    pub status: TransactionStatus,
    pub count: u64,
    pub total: Option<Decimal>,
}

/// Query parameters for the admin transaction list.
///
/// The admin listing filters on these fields only. Amount range, search and
/// ordering belong to the per-user list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdminTransactionFilter {
    pub status: Option<TransactionStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub user_id: Option<i64>,
    pub page: Option<u32>,
}

impl AdminTransactionFilter {
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
        if let Some(user_id) = self.user_id {
            query.push(("user_id".to_string(), user_id.to_string()));
        }
        query
    }
}
