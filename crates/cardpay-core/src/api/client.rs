//! Authenticated API client for the ledger and payment services.
//!
//! `ApiClient` is the single entry point for outbound calls. Every request
//! goes through the refresh coordinator, so an expired access token is
//! renewed and the call replayed without the caller noticing.

use std::sync::Arc;

use reqwest::Response;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

use super::endpoints::{AdminApi, AuthApi, CardsApi, PaymentsApi, TransactionsApi};
use super::dispatch::Dispatcher;
use super::refresh::{RefreshCoordinator, SessionEvent};
use super::request::PendingRequest;
use super::ApiError;
use crate::auth::{CredentialStore, TokenPair};
use crate::config::Config;
use crate::models::Theme;

/// API client for cardpay.
/// Clone is cheap - all clones share the connection pool, the credential
/// store and the in-flight refresh.
#[derive(Clone)]
pub struct ApiClient {
    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let dispatcher = Dispatcher::new(config)?;
        Ok(Self {
            coordinator: RefreshCoordinator::new(dispatcher, store),
        })
    }

    /// Send a request and return the raw successful response
    pub async fn send(&self, request: PendingRequest) -> Result<Response, ApiError> {
        self.coordinator.execute(request).await
    }

    /// Send a request and decode the JSON response body
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: PendingRequest,
    ) -> Result<T, ApiError> {
        let path = request.operation().path();
        let response = self.send(request).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", path, e)))
    }

    /// Send a request and return the body bytes untouched
    pub async fn send_bytes(&self, request: PendingRequest) -> Result<Vec<u8>, ApiError> {
        let response = self.send(request).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Send a request whose response body is irrelevant (e.g. 204 deletes)
    pub async fn send_empty(&self, request: PendingRequest) -> Result<(), ApiError> {
        self.send(request).await?;
        Ok(())
    }

    pub fn auth(&self) -> AuthApi<'_> {
        AuthApi::new(self)
    }

    pub fn cards(&self) -> CardsApi<'_> {
        CardsApi::new(self)
    }

    pub fn transactions(&self) -> TransactionsApi<'_> {
        TransactionsApi::new(self)
    }

    pub fn payments(&self) -> PaymentsApi<'_> {
        PaymentsApi::new(self)
    }

    pub fn admin(&self) -> AdminApi<'_> {
        AdminApi::new(self)
    }

    /// Stored credential pair, if any
    pub fn tokens(&self) -> Result<Option<TokenPair>, ApiError> {
        self.coordinator.tokens()
    }

    /// Store a freshly issued pair, starting a new session
    pub fn install_tokens(&self, pair: &TokenPair) -> Result<(), ApiError> {
        self.coordinator.install(pair)
    }

    /// Drop the stored pair. Any refresh still in flight is discarded.
    pub fn clear_session(&self) -> Result<(), ApiError> {
        self.coordinator.clear()
    }

    /// Session events raised by the refresh coordinator
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.coordinator.subscribe()
    }

    pub fn theme(&self) -> Result<Theme, ApiError> {
        self.coordinator.theme()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), ApiError> {
        self.coordinator.set_theme(theme)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::api::request::Operation;
    use crate::auth::MemoryStore;

    fn client_for(server: &MockServer, store: Arc<MemoryStore>) -> ApiClient {
        ApiClient::new(&Config::for_base_urls(server.base_url(), server.base_url()), store).unwrap()
    }

    #[tokio::test]
    async fn test_send_json_reports_undecodable_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/auth/profile/");
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let client = client_for(&server, Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1"))));
        let err = client
            .send_json::<serde_json::Value>(PendingRequest::new(Operation::Profile))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::InvalidResponse(ref msg) if msg.contains("/api/auth/profile/")));
    }

    #[tokio::test]
    async fn test_send_bytes_returns_raw_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/admin-panel/transactions/export/csv/")
                    .header("Accept", "text/csv");
                then.status(200)
                    .header("Content-Type", "text/csv")
                    .body("id,amount\n1,10.00\n");
            })
            .await;

        let client = client_for(&server, Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1"))));
        let bytes = client
            .send_bytes(PendingRequest::new(Operation::AdminExportCsv).accept("text/csv"))
            .await
            .unwrap();

        assert_eq!(bytes, b"id,amount\n1,10.00\n");
    }

    #[tokio::test]
    async fn test_clones_share_session_state() {
        let server = MockServer::start_async().await;
        let store = Arc::new(MemoryStore::new());
        let client = client_for(&server, store.clone());
        let clone = client.clone();

        client.install_tokens(&TokenPair::new("a1", "r1")).unwrap();
        assert_eq!(clone.tokens().unwrap(), Some(TokenPair::new("a1", "r1")));

        clone.set_theme(Theme::Dark).unwrap();
        assert_eq!(client.theme().unwrap(), Theme::Dark);

        clone.clear_session().unwrap();
        assert!(client.tokens().unwrap().is_none());
        assert!(store.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bearer_follows_stored_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/cards/")
                    .header("Authorization", "Bearer fresh");
                then.status(200).json_body(json!([]));
            })
            .await;

        let client = client_for(&server, Arc::new(MemoryStore::new()));
        client.install_tokens(&TokenPair::new("fresh", "r")).unwrap();
        client
            .send_empty(PendingRequest::new(Operation::ListCards))
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
