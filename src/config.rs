//! Service configuration
//!
//! Loaded from a YAML file (`deckflow.yaml` by default), with environment
//! overrides for secrets so they never have to live on disk:
//!
//! ```yaml
//! server:
//!   bind_addr: 127.0.0.1:8090
//! relay:
//!   bind_addr: 127.0.0.1:8091
//! database:
//!   type: sqlite
//!   path: .deckflow/deckflow.db
//! provider:
//!   base_url: https://render.example.com
//! webhook:
//!   public_url: https://app.example.com/api/webhooks/render
//! engine:
//!   max_parallel_steps: 3
//! ```
//!
//! Environment overrides: `DECKFLOW_WEBHOOK_SECRET`,
//! `DECKFLOW_TOKEN_SECRET`, `DECKFLOW_PROVIDER_API_KEY`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::provider::ProviderConfig;
use crate::tasks::PollerConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub relay: RelaySettings,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub poller: PollerConfig,

    #[serde(default)]
    pub webhook: WebhookSettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_addr")]
    pub bind_addr: String,
}

fn default_server_addr() -> String {
    "127.0.0.1:8090".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_server_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    #[serde(default = "default_relay_addr")]
    pub bind_addr: String,

    /// Seconds an unauthenticated socket may linger before being dropped
    #[serde(default = "default_auth_grace")]
    pub auth_grace_secs: u64,
}

fn default_relay_addr() -> String {
    "127.0.0.1:8091".to_string()
}

fn default_auth_grace() -> u64 {
    10
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind_addr: default_relay_addr(),
            auth_grace_secs: default_auth_grace(),
        }
    }
}

/// Database backing for the store
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    #[default]
    Memory,
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: String,
    },
}

fn default_sqlite_path() -> String {
    ".deckflow/deckflow.db".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_max_parallel_steps")]
    pub max_parallel_steps: usize,

    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_parallel_steps() -> usize {
    3
}

fn default_history_limit() -> usize {
    100
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_parallel_steps: default_max_parallel_steps(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    /// Shared secret for signature verification. Unset skips verification
    /// entirely (trust-the-network mode).
    #[serde(default)]
    pub secret: Option<String>,

    /// Externally reachable URL of the webhook endpoint, passed to the
    /// render service at task creation
    #[serde(default)]
    pub public_url: Option<String>,

    /// When false, webhook delivery is assumed unavailable and a poller is
    /// spawned for every created task
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            secret: None,
            public_url: None,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Secret for bearer-token verification, shared with the identity issuer
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
}

fn default_token_secret() -> String {
    "insecure-dev-secret".to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, falling back to defaults when
    /// no path is given. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_yaml::from_str(&raw)?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("DECKFLOW_WEBHOOK_SECRET") {
            if !secret.is_empty() {
                self.webhook.secret = Some(secret);
            }
        }
        if let Ok(secret) = std::env::var("DECKFLOW_TOKEN_SECRET") {
            if !secret.is_empty() {
                self.auth.token_secret = secret;
            }
        }
        if let Ok(key) = std::env::var("DECKFLOW_PROVIDER_API_KEY") {
            if !key.is_empty() {
                self.provider.api_key = Some(key);
            }
        }
    }
}
