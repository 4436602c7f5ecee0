//! cardpay core library.
//!
//! Authenticated API client for the cardpay ledger and payment services,
//! with durable credential storage, transparent token refresh, the session
//! lifecycle and typed models.
//!
//! - `api`: request dispatch, single-flight refresh, typed endpoint surfaces
//! - `auth`: credential stores and the session controller
//! - `checkout`: pay with a saved card and record the outcome
//! - `config`: service addresses, timeout and credential backend
//! - `models`: users, cards, transactions, payments, admin reports

pub mod api;
pub mod auth;
pub mod checkout;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, SessionEvent};
pub use auth::{CredentialStore, SessionController, SessionError, SessionState, TokenPair};
pub use checkout::{Checkout, CheckoutError, CheckoutOutcome};
pub use config::{Config, CredentialBackend};
