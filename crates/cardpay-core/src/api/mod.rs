//! REST API client for the cardpay ledger and payment services.
//!
//! This module provides the `ApiClient`, which attaches the stored bearer
//! token to every call and transparently renews it when the ledger rejects
//! it as expired.
//!
//! Layers, from the wire up:
//! - `request`: operations, the route table and replayable request values
//! - `dispatch`: one HTTP round trip per call, never retries
//! - `refresh`: single-flight token refresh and one-shot replay
//! - `client` / `endpoints`: the public facade and typed surfaces

pub mod client;
pub mod dispatch;
pub mod endpoints;
pub mod error;
pub mod refresh;
pub mod request;

pub use client::ApiClient;
pub use error::ApiError;
pub use refresh::SessionEvent;
pub use request::{Operation, PendingRequest, ResourceGroup, Service};
