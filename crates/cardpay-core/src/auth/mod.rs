//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: durable storage for the token pair and theme, with
//!   file, OS keychain and in-memory backends
//! - `SessionController`: login, register, logout and bootstrap, exposing
//!   the session state to the rest of the application

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, FileStore, KeyringStore, MemoryStore, TokenPair};
pub use session::{SessionController, SessionError, SessionState};
