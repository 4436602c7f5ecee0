//! Transparent recovery from expired access tokens.
//!
//! Every request goes through [`RefreshCoordinator::execute`]. A 401 on a
//! request that has not been replayed yet triggers one refresh exchange,
//! shared by every request that fails at the same time, and then a single
//! replay with the new token. If the refresh is rejected the session is
//! cleared and [`SessionEvent::Invalidated`] is broadcast.
//!
//! All token writes go through one short synchronous lock together with a
//! session generation counter. A refresh that started in an older generation
//! never writes, so clearing the session while a refresh is in flight cannot
//! be undone by that refresh finishing later.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Response;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::request::PendingRequest;
use super::ApiError;
use crate::auth::{CredentialStore, TokenPair};
use crate::models::Theme;

/// Buffer for session events; subscribers only care about the latest one
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Signals the coordinator raises for the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were rejected for good and the store has been cleared
    Invalidated,
}

/// Why a recovery attempt did not produce a usable token. Cloned to every
/// waiter of a shared refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RecoveryFailure {
    NoRefreshToken,
    Rejected(String),
    Superseded,
    Storage(String),
}

type RefreshHandle = Shared<BoxFuture<'static, Result<(), RecoveryFailure>>>;

struct TokenState {
    generation: u64,
    /// In-progress refresh and the generation it belongs to
    inflight: Option<(u64, RefreshHandle)>,
}

/// What a request was sent with
struct Snapshot {
    generation: u64,
    access: Option<String>,
}

pub struct RefreshCoordinator {
    dispatcher: Dispatcher,
    store: Arc<dyn CredentialStore>,
    state: Mutex<TokenState>,
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(dispatcher: Dispatcher, store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            dispatcher,
            store,
            state: Mutex::new(TokenState {
                generation: 0,
                inflight: None,
            }),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self) -> Result<Snapshot, ApiError> {
        let state = self.lock();
        let access = self.store.get()?.map(|pair| pair.access);
        Ok(Snapshot {
            generation: state.generation,
            access,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn tokens(&self) -> Result<Option<TokenPair>, ApiError> {
        let _state = self.lock();
        Ok(self.store.get()?)
    }

    /// Store a freshly issued pair and start a new session generation
    pub fn install(&self, pair: &TokenPair) -> Result<(), ApiError> {
        let mut state = self.lock();
        self.store.set(pair)?;
        state.generation += 1;
        state.inflight = None;
        debug!(generation = state.generation, "Installed new token pair");
        Ok(())
    }

    /// Explicit logout. Wins over any refresh still in flight.
    pub fn clear(&self) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.generation += 1;
        state.inflight = None;
        self.store.clear()?;
        debug!(generation = state.generation, "Cleared token pair");
        Ok(())
    }

    pub fn theme(&self) -> Result<Theme, ApiError> {
        Ok(self.store.theme()?)
    }

    pub fn set_theme(&self, theme: Theme) -> Result<(), ApiError> {
        Ok(self.store.set_theme(theme)?)
    }

    /// Dispatch a request, recovering once from an expired access token.
    pub async fn execute(self: &Arc<Self>, request: PendingRequest) -> Result<Response, ApiError> {
        let sent = self.snapshot()?;

        let original = match self
            .dispatcher
            .dispatch(&request, sent.access.as_deref())
            .await
        {
            Err(err) if err.is_unauthorized() && request.may_recover() => err,
            outcome => return outcome,
        };

        let replay = request.into_retry();
        debug!(
            path = %replay.operation().path(),
            "Access token rejected, attempting recovery"
        );

        if let Err(failure) = self.recover(&sent).await {
            debug!(?failure, "Recovery failed, propagating original error");
            return Err(original);
        }

        // Read back so the replay carries exactly what is stored right now
        let current = self.snapshot()?;
        match current.access {
            Some(ref access) if current.generation == sent.generation => {
                self.dispatcher.dispatch(&replay, Some(access.as_str())).await
            }
            _ => Err(original),
        }
    }

    async fn recover(self: &Arc<Self>, sent: &Snapshot) -> Result<(), RecoveryFailure> {
        let handle = {
            let mut state = self.lock();
            if state.generation != sent.generation {
                return Err(RecoveryFailure::Superseded);
            }

            let pair = self
                .store
                .get()
                .map_err(|e| RecoveryFailure::Storage(e.to_string()))?;

            match pair {
                None => {
                    warn!("No refresh token available, invalidating session");
                    self.invalidate_locked(&mut state);
                    return Err(RecoveryFailure::NoRefreshToken);
                }
                Some(pair) if sent.access.as_deref() != Some(pair.access.as_str()) => {
                    debug!("Access token already refreshed by another request");
                    return Ok(());
                }
                Some(pair) => {
                    let generation = state.generation;
                    let joinable = match &state.inflight {
                        Some((g, handle)) if *g == generation => Some(handle.clone()),
                        _ => None,
                    };
                    match joinable {
                        Some(handle) => {
                            debug!("Joining refresh already in flight");
                            handle
                        }
                        None => {
                            let handle = self.start_refresh(pair.refresh, generation);
                            state.inflight = Some((generation, handle.clone()));
                            handle
                        }
                    }
                }
            }
        };

        handle.await
    }

    /// The handle lives in `TokenState`, so it only holds a weak reference
    /// back to the coordinator.
    fn start_refresh(self: &Arc<Self>, refresh: String, generation: u64) -> RefreshHandle {
        let weak = Arc::downgrade(self);
        let dispatcher = self.dispatcher.clone();

        async move {
            info!("Refreshing access token");
            let outcome = dispatcher.exchange_refresh(&refresh).await;

            let Some(this) = weak.upgrade() else {
                debug!("Client dropped during refresh, discarding result");
                return Err(RecoveryFailure::Superseded);
            };
            let mut state = this.lock();
            if matches!(&state.inflight, Some((g, _)) if *g == generation) {
                state.inflight = None;
            }
            if state.generation != generation {
                debug!("Session changed during refresh, discarding result");
                return Err(RecoveryFailure::Superseded);
            }

            match outcome {
                Ok(tokens) => {
                    let pair = TokenPair {
                        access: tokens.access,
                        refresh: tokens.refresh.unwrap_or(refresh),
                    };
                    if let Err(e) = this.store.set(&pair) {
                        warn!(error = %e, "Failed to persist refreshed token");
                        this.invalidate_locked(&mut state);
                        return Err(RecoveryFailure::Storage(e.to_string()));
                    }
                    info!("Access token refreshed");
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, invalidating session");
                    this.invalidate_locked(&mut state);
                    Err(RecoveryFailure::Rejected(e.to_string()))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Clear the store, end the generation and tell the session layer.
    /// Runs at most once per generation because the caller holds the lock
    /// and has checked the generation.
    fn invalidate_locked(&self, state: &mut TokenState) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store");
        }
        state.generation += 1;
        state.inflight = None;
        // No subscribers is fine
        let _ = self.events.send(SessionEvent::Invalidated);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::api::request::Operation;
    use crate::auth::MemoryStore;
    use crate::config::Config;

    fn coordinator(server: &MockServer, store: Arc<MemoryStore>) -> Arc<RefreshCoordinator> {
        let config = Config::for_base_urls(server.base_url(), server.base_url());
        RefreshCoordinator::new(Dispatcher::new(&config).unwrap(), store)
    }

    fn list_transactions() -> PendingRequest {
        PendingRequest::new(Operation::ListTransactions)
    }

    async fn body_of(response: Response) -> serde_json::Value {
        response.json().await.unwrap()
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_replayed() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/transactions/")
                    .header("Authorization", "Bearer a1");
                then.status(401)
                    .json_body(json!({"detail": "Given token not valid for any token type"}));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/token/refresh/")
                    .json_body(json!({"refresh": "r1"}));
                then.status(200).json_body(json!({"access": "a2"}));
            })
            .await;
        let replayed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/transactions/")
                    .header("Authorization", "Bearer a2");
                then.status(200).json_body(json!({"count": 0, "results": []}));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());

        let response = coordinator.execute(list_transactions()).await.unwrap();
        assert_eq!(body_of(response).await["count"], 0);

        assert_eq!(rejected.calls_async().await, 1);
        assert_eq!(refresh.calls_async().await, 1);
        assert_eq!(replayed.calls_async().await, 1);
        assert_eq!(store.get().unwrap(), Some(TokenPair::new("a2", "r1")));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_stored() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/api/cards/").header("Authorization", "Bearer a1");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.path("/api/auth/token/refresh/");
                then.status(200).json_body(json!({"access": "a2", "refresh": "r2"}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.path("/api/cards/").header("Authorization", "Bearer a2");
                then.status(200).json_body(json!([]));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());
        coordinator
            .execute(PendingRequest::new(Operation::ListCards))
            .await
            .unwrap();

        assert_eq!(store.get().unwrap(), Some(TokenPair::new("a2", "r2")));
    }

    #[tokio::test]
    async fn test_concurrent_401s_share_one_refresh() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/transactions/")
                    .header("Authorization", "Bearer a1");
                then.status(401).delay(Duration::from_millis(100));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/auth/token/refresh/")
                    .json_body(json!({"refresh": "r1"}));
                then.status(200)
                    .delay(Duration::from_millis(200))
                    .json_body(json!({"access": "a2"}));
            })
            .await;
        let replayed = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/transactions/")
                    .header("Authorization", "Bearer a2");
                then.status(200).json_body(json!([]));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());

        let (a, b, c) = tokio::join!(
            coordinator.execute(list_transactions()),
            coordinator.execute(list_transactions()),
            coordinator.execute(list_transactions()),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());

        assert_eq!(rejected.calls_async().await, 3);
        assert_eq!(refresh.calls_async().await, 1);
        assert_eq!(replayed.calls_async().await, 3);
        assert_eq!(store.get().unwrap(), Some(TokenPair::new("a2", "r1")));
    }

    #[tokio::test]
    async fn test_rejected_refresh_invalidates_once() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/transactions/");
                then.status(401).delay(Duration::from_millis(100));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/token/refresh/");
                then.status(401)
                    .delay(Duration::from_millis(100))
                    .json_body(json!({"detail": "Token is blacklisted", "code": "token_not_valid"}));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());
        let mut events = coordinator.subscribe();

        let (a, b, c) = tokio::join!(
            coordinator.execute(list_transactions()),
            coordinator.execute(list_transactions()),
            coordinator.execute(list_transactions()),
        );
        for result in [a, b, c] {
            assert!(result.unwrap_err().is_unauthorized());
        }

        assert_eq!(refresh.calls_async().await, 1);
        assert!(store.get().unwrap().is_none());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Invalidated);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replayed_request_is_not_retried_again() {
        let server = MockServer::start_async().await;
        let rejected = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/transactions/");
                then.status(401);
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/token/refresh/");
                then.status(200).json_body(json!({"access": "a2"}));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());

        let err = coordinator.execute(list_transactions()).await.unwrap_err();
        assert!(err.is_unauthorized());

        // One original attempt plus exactly one replay
        assert_eq!(rejected.calls_async().await, 2);
        assert_eq!(refresh.calls_async().await, 1);
        // The refresh itself succeeded, so the session survives
        assert_eq!(store.get().unwrap(), Some(TokenPair::new("a2", "r1")));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_invalidates_without_refresh_call() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/transactions/");
                then.status(401);
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.path("/api/auth/token/refresh/");
                then.status(200).json_body(json!({"access": "a2"}));
            })
            .await;

        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(&server, store.clone());
        let mut events = coordinator.subscribe();

        let err = coordinator.execute(list_transactions()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(refresh.calls_async().await, 0);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Invalidated);
    }

    #[tokio::test]
    async fn test_other_errors_pass_through_untouched() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/transactions/");
                then.status(403).json_body(json!({"detail": "You do not have permission."}));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.path("/api/auth/token/refresh/");
                then.status(200).json_body(json!({"access": "a2"}));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());

        let err = coordinator.execute(list_transactions()).await.unwrap_err();
        assert!(matches!(err, ApiError::AccessDenied { .. }));
        assert_eq!(err.user_message(), "You do not have permission.");
        assert_eq!(refresh.calls_async().await, 0);
        assert_eq!(store.get().unwrap(), Some(TokenPair::new("a1", "r1")));
    }

    #[tokio::test]
    async fn test_login_401_is_not_intercepted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/login/");
                then.status(401)
                    .json_body(json!({"detail": "No active account found with the given credentials"}));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.path("/api/auth/token/refresh/");
                then.status(200).json_body(json!({"access": "a2"}));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());

        let request = PendingRequest::new(Operation::Login)
            .json(&json!({"email": "a@b.c", "password": "wrong"}))
            .unwrap();
        let err = coordinator.execute(request).await.unwrap_err();

        assert_eq!(
            err.user_message(),
            "No active account found with the given credentials"
        );
        assert_eq!(refresh.calls_async().await, 0);
        assert!(store.get().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_during_refresh_wins() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/transactions/");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/auth/token/refresh/");
                then.status(200)
                    .delay(Duration::from_millis(300))
                    .json_body(json!({"access": "a2"}));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());
        let mut events = coordinator.subscribe();

        let (result, _) = tokio::join!(coordinator.execute(list_transactions()), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            coordinator.clear().unwrap();
        });

        assert!(result.unwrap_err().is_unauthorized());
        assert!(store.get().unwrap().is_none());
        // Explicit clear is not an invalidation
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_401_after_refresh_reuses_new_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/api/cards/").header("Authorization", "Bearer a1");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.path("/api/cards/").header("Authorization", "Bearer a2");
                then.status(200).json_body(json!([]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.path("/api/transactions/")
                    .header("Authorization", "Bearer a1");
                then.status(401).delay(Duration::from_millis(500));
            })
            .await;
        let late_replay = server
            .mock_async(|when, then| {
                when.path("/api/transactions/")
                    .header("Authorization", "Bearer a2");
                then.status(200).json_body(json!([]));
            })
            .await;
        let refresh = server
            .mock_async(|when, then| {
                when.path("/api/auth/token/refresh/");
                then.status(200).json_body(json!({"access": "a2"}));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store.clone());

        let (cards, transactions) = tokio::join!(
            coordinator.execute(PendingRequest::new(Operation::ListCards)),
            coordinator.execute(list_transactions()),
        );
        assert!(cards.is_ok());
        assert!(transactions.is_ok());

        assert_eq!(refresh.calls_async().await, 1);
        assert_eq!(late_replay.calls_async().await, 1);
    }

    #[tokio::test]
    async fn test_abandoned_refresh_does_not_keep_coordinator_alive() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/transactions/");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.path("/api/auth/token/refresh/");
                then.status(200)
                    .json_body(json!({"access": "a2"}))
                    .delay(Duration::from_millis(500));
            })
            .await;

        let store = Arc::new(MemoryStore::with_pair(TokenPair::new("a1", "r1")));
        let coordinator = coordinator(&server, store);

        // Give up while the refresh is still in flight
        let abandoned =
            tokio::time::timeout(Duration::from_millis(200), coordinator.execute(list_transactions()))
                .await;
        assert!(abandoned.is_err());
        assert!(coordinator.lock().inflight.is_some());

        let weak = Arc::downgrade(&coordinator);
        drop(coordinator);
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_install_starts_new_generation() {
        let server = MockServer::start_async().await;
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(&server, store.clone());

        coordinator.install(&TokenPair::new("a1", "r1")).unwrap();
        assert_eq!(coordinator.lock().generation, 1);
        assert_eq!(coordinator.tokens().unwrap(), Some(TokenPair::new("a1", "r1")));

        coordinator.clear().unwrap();
        assert_eq!(coordinator.lock().generation, 2);
        assert!(coordinator.tokens().unwrap().is_none());
    }
}
