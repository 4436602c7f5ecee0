use serde::{Deserialize, Serialize};

use crate::api::request::{Operation, PendingRequest};
use crate::api::{ApiClient, ApiError};
use crate::auth::TokenPair;
use crate::models::{NewUser, PasswordChange, UserProfile};

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh: &'a str,
}

/// Login answer. Some deployments embed the user next to the tokens.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

pub struct AuthApi<'a> {
    client: &'a ApiClient,
}

impl<'a> AuthApi<'a> {
    pub(crate) fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Exchange credentials for a token pair. Does not store it.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = PendingRequest::new(Operation::Login).json(&Credentials { email, password })?;
        self.client.send_json(request).await
    }

    pub async fn register(&self, user: &NewUser) -> Result<RegisterResponse, ApiError> {
        let request = PendingRequest::new(Operation::Register).json(user)?;
        self.client.send_json(request).await
    }

    /// Ask the ledger to blacklist the refresh token
    pub async fn logout(&self, refresh: &str) -> Result<(), ApiError> {
        let request = PendingRequest::new(Operation::Logout).json(&LogoutRequest { refresh })?;
        self.client.send_empty(request).await
    }

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.client
            .send_json(PendingRequest::new(Operation::Profile))
            .await
    }

    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        let request = PendingRequest::new(Operation::ChangePassword).json(change)?;
        self.client.send_empty(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::auth::MemoryStore;
    use crate::config::Config;

    fn profile_json() -> serde_json::Value {
        json!({"id": 3, "email": "a@b.c", "username": "ab", "first_name": "A", "last_name": "B",
               "phone": null, "is_admin": false, "created_at": "2025-03-01T10:30:00Z"})
    }

    #[tokio::test]
    async fn test_login_parses_tokens() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/login/")
                    .json_body(json!({"email": "a@b.c", "password": "pw"}));
                then.status(200).json_body(json!({"access": "a1", "refresh": "r1"}));
            })
            .await;

        let client = ApiClient::new(
            &Config::for_base_urls(server.base_url(), server.base_url()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let login = client.auth().login("a@b.c", "pw").await.unwrap();

        assert_eq!(login.tokens, TokenPair::new("a1", "r1"));
        assert!(login.user.is_none());
        // login alone never stores anything
        assert!(client.tokens().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_parses_nested_tokens() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/register/");
                then.status(201).json_body(json!({
                    "user": profile_json(),
                    "tokens": {"access": "a1", "refresh": "r1"},
                    "message": "User registered successfully"
                }));
            })
            .await;

        let client = ApiClient::new(
            &Config::for_base_urls(server.base_url(), server.base_url()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap();
        let user = NewUser {
            email: "a@b.c".into(),
            username: "ab".into(),
            password: "pw123456".into(),
            password2: "pw123456".into(),
            first_name: Some("A".into()),
            last_name: Some("B".into()),
            phone: None,
        };
        let registered = client.auth().register(&user).await.unwrap();

        assert_eq!(registered.user.id, 3);
        assert_eq!(registered.tokens, TokenPair::new("a1", "r1"));
    }

    #[tokio::test]
    async fn test_logout_sends_refresh_token() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/logout/")
                    .header("Authorization", "Bearer a1")
                    .json_body(json!({"refresh": "r1"}));
                then.status(200).json_body(json!({"message": "Logged out successfully"}));
            })
            .await;

        let client = ApiClient::new(
            &Config::for_base_urls(server.base_url(), server.base_url()),
            Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1"))),
        )
        .unwrap();
        client.auth().logout("r1").await.unwrap();

        mock.assert_async().await;
    }
}
