//! Typed surfaces over the route table, one per resource group.
//!
//! Each surface borrows the [`ApiClient`](super::ApiClient), builds a
//! [`PendingRequest`](super::PendingRequest) for its operation and decodes the
//! response into a model. None of them touch tokens directly.

pub mod admin;
pub mod auth;
pub mod cards;
pub mod payments;
pub mod transactions;

pub use admin::AdminApi;
pub use auth::{AuthApi, LoginResponse, RegisterResponse};
pub use cards::CardsApi;
pub use payments::PaymentsApi;
pub use transactions::TransactionsApi;
