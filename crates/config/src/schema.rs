/// Config schema types (server, provider, contact cache, realtime channel, database).
use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub contacts: ContactsConfig,
    pub realtime: RealtimeConfig,
    pub database: DatabaseConfig,
    pub metrics: MetricsConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

/// Messaging provider (upstream) connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the provider's REST API, e.g. `https://evo.example.com`.
    pub base_url: String,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Bound on every outbound HTTP call, in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            timeout_secs: 15,
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    value: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Contact resolution cache windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactsConfig {
    /// Freshness of an entry whose last known state is "exists".
    pub exists_ttl_secs: u64,
    /// Freshness of an entry whose last known state is "does not exist".
    pub absent_ttl_secs: u64,
    /// Minimum spacing between upstream attempts for the same contact.
    pub rate_limit_secs: u64,
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            exists_ttl_secs: 24 * 60 * 60,
            absent_ttl_secs: 6 * 60 * 60,
            rate_limit_secs: 5 * 60,
        }
    }
}

/// Real-time (WebSocket) channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Allowed browser origins. Empty means any origin.
    pub cors_origins: Vec<String>,
    pub max_payload_bytes: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            max_payload_bytes: 65_536,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLx connection URL. `None` means `<data_dir>/switchboard.db`.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
