//! Data models for ledger and payment-service records.
//!
//! - `UserProfile`, `NewUser`, `UserUpdate`: accounts
//! - `Card`, `NewCard`: saved cards (masked numbers only)
//! - `Transaction`, `TransactionFilter`: ledger transactions
//! - `PaymentRequest`, `PaymentReceipt`: payment-service calls
//! - `AdminLogEntry`, `DailySummaryRow`, `AdminTransactionFilter`: admin panel
//! - `Page`: paginated list envelope

pub mod admin;
pub mod card;
pub mod page;
pub mod payment;
pub mod preferences;
pub mod transaction;
pub mod user;

pub use admin::{AdminLogEntry, AdminTransactionFilter, DailySummaryRow};
pub use card::{Card, CardType, NewCard};
pub use page::Page;
pub use payment::{PaymentReceipt, PaymentRequest, ServiceHealth};
pub use preferences::Theme;
pub use transaction::{NewTransaction, StatusUpdate, Transaction, TransactionFilter, TransactionStatus};
pub use user::{NewUser, PasswordChange, UserProfile, UserUpdate};
