//! Session lifecycle: bootstrap, login, register and logout.
//!
//! The controller owns the tri-state [`SessionState`] and publishes it on a
//! `watch` channel. It listens for [`SessionEvent::Invalidated`] from the API
//! client so a rejected refresh always ends in `Unauthenticated`.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, SessionEvent};
use crate::auth::TokenPair;
use crate::models::{NewUser, Theme, UserProfile};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Startup, before the stored session has been checked
    Loading,
    Unauthenticated,
    Authenticated(UserProfile),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticated(_) => "authenticated",
        }
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        match self {
            SessionState::Authenticated(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    fn can_become(&self, next: &SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Loading, Unauthenticated)
                | (Loading, Authenticated(_))
                | (Unauthenticated, Authenticated(_))
                | (Authenticated(_), Unauthenticated)
        )
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(ApiError),

    /// The ledger refused the email/password pair
    #[error("Invalid email or password")]
    InvalidCredentials(#[source] ApiError),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Session storage failed: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Storage(e) => SessionError::Storage(e),
            other => SessionError::Api(other),
        }
    }
}

impl SessionError {
    /// Map a failed credential exchange. A 401 there means bad credentials,
    /// not an expired session.
    fn from_login(err: ApiError) -> Self {
        if err.is_unauthorized() {
            SessionError::InvalidCredentials(err)
        } else {
            err.into()
        }
    }

    /// Short message suitable for showing to a user
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(e) => e.user_message(),
            SessionError::InvalidCredentials(e) => {
                e.server_message().unwrap_or_else(|| self.to_string())
            }
            other => other.to_string(),
        }
    }
}

/// Apply a state change if the state machine allows it.
fn transition(
    state: &watch::Sender<SessionState>,
    next: SessionState,
) -> Result<(), SessionError> {
    let mut outcome = Ok(());
    state.send_if_modified(|current| {
        if current.can_become(&next) {
            info!(from = current.name(), to = next.name(), "Session state changed");
            *current = next;
            true
        } else {
            let err = SessionError::InvalidTransition {
                from: current.name(),
                to: next.name(),
            };
            warn!(error = %err, "Rejected session transition");
            outcome = Err(err);
            false
        }
    });
    outcome
}

/// Move to `Unauthenticated` from whatever state we are in.
/// Both `Loading` and `Authenticated` may always do so.
fn settle_unauthenticated(state: &watch::Sender<SessionState>) {
    state.send_if_modified(|current| {
        if matches!(current, SessionState::Unauthenticated) {
            return false;
        }
        info!(from = current.name(), "Session ended");
        *current = SessionState::Unauthenticated;
        true
    });
}

async fn listen_for_invalidation(
    mut events: broadcast::Receiver<SessionEvent>,
    state: Arc<watch::Sender<SessionState>>,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Invalidated) => {
                // Bootstrap settles Loading itself
                if state.borrow().is_authenticated() {
                    warn!("Session invalidated, please sign in again");
                    settle_unauthenticated(&state);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Session listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Orchestrates authentication against the ledger.
///
/// Must be created inside a tokio runtime; it spawns the invalidation
/// listener, which is stopped when the controller is dropped.
pub struct SessionController {
    client: ApiClient,
    state: Arc<watch::Sender<SessionState>>,
    listener: JoinHandle<()>,
}

impl SessionController {
    pub fn new(client: ApiClient) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        let state = Arc::new(state);
        let listener = tokio::spawn(listen_for_invalidation(
            client.subscribe(),
            Arc::clone(&state),
        ));

        Self {
            client,
            state,
            listener,
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Observe every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.state.borrow().profile().cloned()
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().profile().is_some_and(|p| p.is_admin)
    }

    /// Resolve `Loading` from whatever the credential store holds.
    ///
    /// With no stored token this makes no network call. A stored token that
    /// no longer yields a profile is cleared. Calling this again once the
    /// state has settled is a no-op.
    pub async fn bootstrap(&self) -> Result<SessionState, SessionError> {
        if !matches!(*self.state.borrow(), SessionState::Loading) {
            return Ok(self.state());
        }

        let has_token = match self.client.tokens() {
            Ok(tokens) => tokens.is_some(),
            Err(e) => {
                warn!(error = %e, "Could not read stored session, discarding it");
                self.discard_tokens();
                false
            }
        };
        if !has_token {
            debug!("No stored session");
            settle_unauthenticated(&self.state);
            return Ok(self.state());
        }

        match self.client.auth().profile().await {
            Ok(profile) => {
                info!(user_id = profile.id, "Restored stored session");
                transition(&self.state, SessionState::Authenticated(profile))?;
            }
            Err(e) => {
                warn!(error = %e, "Stored session is no longer valid");
                self.discard_tokens();
                settle_unauthenticated(&self.state);
            }
        }
        Ok(self.state())
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, SessionError> {
        self.ensure_signed_out()?;

        let login = self
            .client
            .auth()
            .login(email, password)
            .await
            .map_err(SessionError::from_login)?;
        self.client.install_tokens(&login.tokens)?;

        let profile = match self.client.auth().profile().await {
            Ok(profile) => profile,
            Err(e) => {
                self.discard_tokens();
                return Err(e.into());
            }
        };
        info!(user_id = profile.id, "Signed in");
        self.accept(profile)
    }

    /// Create an account and sign straight into it
    pub async fn register(&self, user: &NewUser) -> Result<UserProfile, SessionError> {
        self.ensure_signed_out()?;

        let registered = self.client.auth().register(user).await?;
        self.client.install_tokens(&registered.tokens)?;
        info!(user_id = registered.user.id, "Registered new account");
        self.accept(registered.user)
    }

    /// Revoke the refresh token if possible, then drop the session.
    /// Never fails because of the server.
    pub async fn logout(&self) -> Result<(), SessionError> {
        match self.client.tokens() {
            Ok(Some(TokenPair { refresh, .. })) => {
                if let Err(e) = self.client.auth().logout(&refresh).await {
                    warn!(error = %e, "Logout request failed, clearing session anyway");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not read stored session"),
        }

        let cleared = self.client.clear_session();
        settle_unauthenticated(&self.state);
        info!("Signed out");
        cleared.map_err(SessionError::from)
    }

    /// Re-fetch the profile, e.g. after an admin changed our flags
    pub async fn refresh_profile(&self) -> Result<UserProfile, SessionError> {
        let profile = self.client.auth().profile().await?;
        let updated = profile.clone();
        let replaced = self.state.send_if_modified(move |current| match current {
            SessionState::Authenticated(existing) => {
                *existing = updated;
                true
            }
            _ => false,
        });
        if !replaced {
            return Err(SessionError::InvalidTransition {
                from: self.state.borrow().name(),
                to: "authenticated",
            });
        }
        Ok(profile)
    }

    pub fn theme(&self) -> Result<Theme, SessionError> {
        Ok(self.client.theme()?)
    }

    pub fn toggle_theme(&self) -> Result<Theme, SessionError> {
        let theme = self.client.theme()?.toggled();
        self.client.set_theme(theme)?;
        debug!(theme = theme.as_str(), "Theme changed");
        Ok(theme)
    }

    fn ensure_signed_out(&self) -> Result<(), SessionError> {
        let current = self.state.borrow();
        if current.is_authenticated() {
            return Err(SessionError::InvalidTransition {
                from: current.name(),
                to: "authenticated",
            });
        }
        Ok(())
    }

    fn accept(&self, profile: UserProfile) -> Result<UserProfile, SessionError> {
        transition(&self.state, SessionState::Authenticated(profile.clone()))?;
        Ok(profile)
    }

    fn discard_tokens(&self) {
        if let Err(e) = self.client.clear_session() {
            warn!(error = %e, "Failed to clear stored session");
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
