//! Server configuration.
//!
//! Built in code or loaded from a TOML file; every field has a default so a
//! partial file works. The config is immutable once the listeners start.

use {
    std::path::Path,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

/// Configuration for one server instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host for both listeners.
    pub host: String,
    /// Primary RPC port. 0 binds an ephemeral port; the discovery listener
    /// always reports the actually-bound port.
    pub port: u16,
    /// Shared secret both sides must present.
    pub secret_key: String,
    /// Whether to run the discovery listener.
    pub enable_discovery: bool,
    /// Port of the discovery listener.
    pub discovery_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1010,
            secret_key: String::new(),
            enable_discovery: true,
            discovery_port: 20000,
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&raw)?;
        debug!(path = %path.display(), "loaded server config");
        Ok(config)
    }
}
