//! Application configuration management.
//!
//! Holds the two service base addresses, the request timeout, which credential
//! backend to use, and the last email used to sign in.
//!
//! Configuration is stored at `~/.config/cardpay/config.json`. Environment
//! variables override the file for the service addresses and the email.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::{CredentialStore, FileStore, KeyringStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "cardpay";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_PAYMENT_URL: &str = "http://localhost:8001";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "CARDPAY_API_URL";
pub const ENV_PAYMENT_URL: &str = "CARDPAY_PAYMENT_URL";
pub const ENV_EMAIL: &str = "CARDPAY_EMAIL";

/// Where the token pair and theme are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger API base address
    pub api_url: String,
    /// Payment service base address
    pub payment_url: String,
    pub request_timeout_secs: u64,
    pub credential_backend: CredentialBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            payment_url: DEFAULT_PAYMENT_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            credential_backend: CredentialBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults when absent), then apply environment overrides.
    ///
    /// The result is a runtime view. It is never written back as a whole, so
    /// an override only lasts as long as its environment variable.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Re-read the file, change it, and write it back
    fn update_file(path: &Path, f: impl FnOnce(&mut Self)) -> Result<()> {
        let mut stored = Self::load_from(path)?;
        f(&mut stored);
        stored.save_to(path)
    }

    /// Remember the email of the last sign in, here and in the config file.
    pub fn remember_email(&mut self, email: impl Into<String>) -> Result<()> {
        let email = email.into();
        self.last_email = Some(email.clone());
        Self::update_file(&Self::config_path()?, |stored| stored.last_email = Some(email))
    }

    /// Config pointed at explicit service addresses, everything else default
    pub fn for_base_urls(api_url: impl Into<String>, payment_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            payment_url: payment_url.into(),
            ..Self::default()
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(url) = non_empty(ENV_PAYMENT_URL) {
            self.payment_url = url;
        }
        if let Some(email) = non_empty(ENV_EMAIL) {
            self.last_email = Some(email);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for durable client state (the file credential store)
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the configured credential backend
    pub fn open_store(&self) -> Result<Arc<dyn CredentialStore>> {
        Ok(match self.credential_backend {
            CredentialBackend::File => Arc::new(FileStore::new(self.data_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringStore::new()?),
        })
    }
}
