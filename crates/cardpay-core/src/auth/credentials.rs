//! Durable storage for the access/refresh token pair and the theme preference.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Theme;

/// Keychain service name used by [`KeyringStore`]
const SERVICE_NAME: &str = "cardpay";

/// Fixed storage keys, shared by every backend
const ACCESS_KEY: &str = "access_token";
const REFRESH_KEY: &str = "refresh_token";
const THEME_KEY: &str = "theme";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Access + refresh token pair. Always stored and cleared together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Process-wide holder of the credential pair.
///
/// Injected into the API client so tests can swap in [`MemoryStore`].
pub trait CredentialStore: Send + Sync {
    /// Current pair, or `None` when logged out
    fn get(&self) -> Result<Option<TokenPair>>;

    /// Persist both tokens atomically
    fn set(&self, pair: &TokenPair) -> Result<()>;

    /// Erase both tokens and every other piece of cached session state
    fn clear(&self) -> Result<()>;

    fn theme(&self) -> Result<Theme>;

    fn set_theme(&self, theme: Theme) -> Result<()>;
}

/// Serialized shape of the durable session document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(rename = "access_token", default, skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(rename = "refresh_token", default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    theme: Option<Theme>,
}

impl StoredState {
    fn pair(&self) -> Option<TokenPair> {
        match (&self.access, &self.refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair::new(access.clone(), refresh.clone())),
            _ => None,
        }
    }

    fn set_pair(&mut self, pair: &TokenPair) {
        self.access = Some(pair.access.clone());
        self.refresh = Some(pair.refresh.clone());
    }
}

// ============================================================================
// File backend
// ============================================================================

/// JSON document in the data directory, written via temp file + rename.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<StoredState> {
        if !self.path.exists() {
            return Ok(StoredState::default());
        }
        let contents = std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        match serde_json::from_str(&contents) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(error = %e, "Session file is corrupt, treating as empty");
                Ok(StoredState::default())
            }
        }
    }

    fn save(&self, state: &StoredState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create data directory")?;
        }
        let contents = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        write_private(&tmp, contents.as_bytes()).context("Failed to write session file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut StoredState)) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut state = self.load()?;
        f(&mut state);
        self.save(&state)
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> Result<Option<TokenPair>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.pair())
    }

    fn set(&self, pair: &TokenPair) -> Result<()> {
        self.update(|state| state.set_pair(pair))
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        debug!(path = ?self.path, "Session file cleared");
        Ok(())
    }

    fn theme(&self) -> Result<Theme> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.theme.unwrap_or_default())
    }

    fn set_theme(&self, theme: Theme) -> Result<()> {
        self.update(|state| state.theme = Some(theme))
    }
}

/// Write a file readable by the owner only (0600 on Unix)
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    // A leftover temp file keeps its old mode, so tighten it explicitly
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()
}

// ============================================================================
// Keyring backend
// ============================================================================

/// OS keychain storage, one entry per fixed key.
///
/// The entries are created once and reused, so every read sees what the
/// previous write stored through the same credential handle.
pub struct KeyringStore {
    access: Entry,
    refresh: Entry,
    theme: Entry,
}

impl KeyringStore {
    pub fn new() -> Result<Self> {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Result<Self> {
        let entry = |key: &str| {
            Entry::new(service, key)
                .with_context(|| format!("Failed to create keyring entry for {}", key))
        };
        Ok(Self {
            access: entry(ACCESS_KEY)?,
            refresh: entry(REFRESH_KEY)?,
            theme: entry(THEME_KEY)?,
        })
    }

    fn read(entry: &Entry, key: &str) -> Result<Option<String>> {
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {} from keychain", key)),
        }
    }

    fn remove(entry: &Entry, key: &str) -> Result<()> {
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {} from keychain", key)),
        }
    }

    fn remove_pair(&self) -> Result<()> {
        Self::remove(&self.access, ACCESS_KEY)?;
        Self::remove(&self.refresh, REFRESH_KEY)
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self) -> Result<Option<TokenPair>> {
        let access = Self::read(&self.access, ACCESS_KEY)?;
        let refresh = Self::read(&self.refresh, REFRESH_KEY)?;
        match (access, refresh) {
            (Some(access), Some(refresh)) => Ok(Some(TokenPair { access, refresh })),
            (None, None) => Ok(None),
            _ => {
                warn!("Keychain holds half a token pair, discarding it");
                self.remove_pair()?;
                Ok(None)
            }
        }
    }

    fn set(&self, pair: &TokenPair) -> Result<()> {
        self.access
            .set_password(&pair.access)
            .context("Failed to store access token in keychain")?;
        if let Err(e) = self.refresh.set_password(&pair.refresh) {
            // Roll back so the keychain never holds a mismatched pair
            Self::remove(&self.access, ACCESS_KEY)?;
            return Err(e).context("Failed to store refresh token in keychain");
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.remove_pair()?;
        Self::remove(&self.theme, THEME_KEY)
    }

    fn theme(&self) -> Result<Theme> {
        Ok(Self::read(&self.theme, THEME_KEY)?
            .and_then(|s| Theme::from_str(&s))
            .unwrap_or_default())
    }

    fn set_theme(&self, theme: Theme) -> Result<()> {
        self.theme
            .set_password(theme.as_str())
            .context("Failed to store theme in keychain")
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Non-durable store for tests and embedding.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoredState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        let mut state = StoredState::default();
        state.set_pair(&pair);
        Self {
            state: Mutex::new(state),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StoredState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> Result<Option<TokenPair>> {
        Ok(self.with_state(|s| s.pair()))
    }

    fn set(&self, pair: &TokenPair) -> Result<()> {
        self.with_state(|s| s.set_pair(pair));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.with_state(|s| *s = StoredState::default());
        Ok(())
    }

    fn theme(&self) -> Result<Theme> {
        Ok(self.with_state(|s| s.theme.unwrap_or_default()))
    }

    fn set_theme(&self, theme: Theme) -> Result<()> {
        self.with_state(|s| s.theme = Some(theme));
        Ok(())
    }
}
