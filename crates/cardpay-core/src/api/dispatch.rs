//! Request dispatcher: one HTTP round trip per call, bearer token attached.
//!
//! The dispatcher never retries. Recovery from expired tokens lives in
//! [`super::refresh::RefreshCoordinator`], which wraps it.

use std::time::Duration;

use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::request::{Operation, PendingRequest, Service};
use super::ApiError;
use crate::config::Config;

/// Default content negotiation for JSON endpoints
const JSON_ACCEPT: &str = "application/json";

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

/// Body of a successful refresh exchange. The refresh token is only present
/// when the server rotates it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// HTTP transport for both backend services.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
    ledger_url: String,
    payments_url: String,
}

impl Dispatcher {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            ledger_url: config.api_url.trim_end_matches('/').to_string(),
            payments_url: config.payment_url.trim_end_matches('/').to_string(),
        })
    }

    fn base_url(&self, service: Service) -> &str {
        match service {
            Service::Ledger => &self.ledger_url,
            Service::Payments => &self.payments_url,
        }
    }

    pub fn url_for(&self, operation: &Operation) -> String {
        format!(
            "{}{}",
            self.base_url(operation.group().service()),
            operation.path()
        )
    }

    /// Send one request. `token` is attached as a bearer credential unless
    /// the operation is a credential exchange.
    pub async fn dispatch(
        &self,
        request: &PendingRequest,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let operation = request.operation();
        let url = self.url_for(operation);

        let mut builder = self
            .client
            .request(operation.method(), &url)
            .header(header::ACCEPT, request.accept_header().unwrap_or(JSON_ACCEPT));

        if !request.query_params().is_empty() {
            builder = builder.query(request.query_params());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let token = token.filter(|_| !operation.is_credential_exchange());
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        debug!(
            group = operation.group().as_str(),
            method = %operation.method(),
            path = %operation.path(),
            authenticated = token.is_some(),
            retry = request.is_retry(),
            "Dispatching request"
        );

        let response = builder.send().await?;
        Self::check_response(response).await
    }

    /// Trade a refresh token for a new access token.
    ///
    /// Goes straight to the transport so a 401 here can never trigger another
    /// refresh.
    pub(crate) async fn exchange_refresh(&self, refresh: &str) -> Result<RefreshResponse, ApiError> {
        let request =
            PendingRequest::new(Operation::RefreshToken).json(&RefreshRequest { refresh })?;
        let response = self.dispatch(&request, None).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse refresh response: {}", e)))
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Request failed");
            Err(ApiError::from_status(status, &body))
        }
    }
}
