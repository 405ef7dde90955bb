//! # Configuration
//!
//! Process-wide settings deserialized from a single JSON file and held
//! immutable for the process lifetime. The database URL may come from the
//! file or from the `DATABASE_URL` environment variable.

use ethers::types::Address;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: ChainSettings,
    /// Address of the exchange factory whose pools are indexed.
    pub factory_addr: Address,
    /// Fixed allow-list of reference (base) tokens used as pricing anchors.
    pub reference_tokens: Vec<Address>,
    /// The USD-pegged member of `reference_tokens`; its quote is fixed at 1.0.
    pub pegged_stable: Address,
    /// Interval between reference-quote refreshes, in seconds.
    #[serde(default = "default_quote_refresh_secs")]
    pub quote_refresh_secs: u64,
    #[serde(default)]
    pub listener: ListenerSettings,
    /// Overridden by `DATABASE_URL` when set.
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    /// HTTP JSON-RPC endpoint for queries and contract calls.
    pub http_url: String,
    /// WebSocket endpoint for the new-block subscription.
    pub ws_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_keepalive_interval_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_keepalive_timeout_secs")]
    pub keepalive_timeout_secs: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_backoff_jitter_factor")]
    pub backoff_jitter_factor: f64,
}

fn default_quote_refresh_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    20
}
fn default_keepalive_interval_secs() -> u64 {
    30
}
fn default_keepalive_timeout_secs() -> u64 {
    15
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_reconnect_base_delay_ms() -> u64 {
    1000
}
fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}
fn default_backoff_jitter_factor() -> f64 {
    0.2
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            keepalive_interval_secs: default_keepalive_interval_secs(),
            keepalive_timeout_secs: default_keepalive_timeout_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            backoff_jitter_factor: default_backoff_jitter_factor(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.reference_tokens.is_empty() {
            return Err(eyre!("reference_tokens must not be empty"));
        }
        if !self.reference_tokens.contains(&self.pegged_stable) {
            return Err(eyre!(
                "pegged_stable {:#x} must be a member of reference_tokens",
                self.pegged_stable
            ));
        }
        if self.listener.max_reconnect_attempts == 0 {
            return Err(eyre!("listener.max_reconnect_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn database_url(&self) -> Option<String> {
        std::env::var("DATABASE_URL")
            .ok()
            .or_else(|| self.database_url.clone())
    }

    pub fn quote_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.quote_refresh_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_pegged_stable_outside_reference_set() {
        let raw = r#"{
            "chain": { "http_url": "http://localhost:8545", "ws_url": "ws://localhost:8546" },
            "factory_addr": "0xca143ce32fe78f1f7019d7d551a6402fc5350c73",
            "reference_tokens": ["0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c"],
            "pegged_stable": "0xe9e7cea3dedca5984780bafc599bd69add087d56"
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn applies_listener_defaults() {
        let settings = ListenerSettings::default();
        assert_eq!(settings.max_reconnect_attempts, 10);
        assert!(settings.reconnect_base_delay_ms < settings.reconnect_max_delay_ms);
    }
}
