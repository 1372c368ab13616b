//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. The frontend's deployment
//! variables (`VITE_DIAMOND_API_HOST` and friends) override the file when set.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// Account the desk places bets for.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    pub diamond: DiamondConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub sportbex: Option<SportBexConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiamondConfig {
    pub host: String,
    /// "http" or "https"; the WebSocket scheme follows it.
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub api_key_env: String,
    /// Casino tables to poll, e.g. ["teen20", "dt20"].
    #[serde(default)]
    pub game_types: Vec<String>,
    /// Topics the mirror subscribes to at startup.
    #[serde(default)]
    pub topics: Vec<String>,
}

impl DiamondConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host.trim_end_matches('/'))
    }

    pub fn ws_url(&self, api_key: &str) -> String {
        let scheme = if self.protocol == "https" { "wss" } else { "ws" };
        format!(
            "{scheme}://{}/ws?key={}",
            self.host.trim_end_matches('/'),
            urlencoding::encode(api_key)
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    pub data_interval_ms: u64,
    pub result_interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            data_interval_ms: 1_000,
            result_interval_ms: 3_000,
        }
    }
}

impl PollerConfig {
    pub fn data_interval(&self) -> Duration {
        Duration::from_millis(self.data_interval_ms.max(1))
    }

    pub fn result_interval(&self) -> Duration {
        Duration::from_millis(self.result_interval_ms.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketConfig {
    pub reconnect_base_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 1_000,
            max_reconnect_attempts: 3,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Serve the edge-function endpoints from this process.
    pub enabled: bool,
    pub port: u16,
    /// Base URL clients use to reach the functions (local or hosted).
    pub url: String,
    pub anon_key_env: String,
    /// CORS origin for browser callers; any origin when unset.
    #[serde(default)]
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SportBexConfig {
    pub base_url: String,
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub snapshot_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_path: "oddsdesk_ledger.json".to_string(),
        }
    }
}

fn default_user_id() -> String {
    "demo-user".to_string()
}

fn default_protocol() -> String {
    "https".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string (no env overrides).
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Apply the deployment variables the frontend build consumes.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VITE_DIAMOND_API_HOST") {
            self.diamond.host = host;
        }
        if let Ok(protocol) = std::env::var("VITE_DIAMOND_API_PROTOCOL") {
            self.diamond.protocol = protocol;
        }
        if let Ok(url) = std::env::var("VITE_SUPABASE_URL") {
            self.gateway.url = url;
        }
        if let Ok(origin) = std::env::var("VITE_APP_URL") {
            self.gateway.allowed_origin = Some(origin);
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a secret referenced by env-var name.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
