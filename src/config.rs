//! Wallet configuration
//!
//! Loaded from `~/.solana-wallet/config.json` when present; every field has a
//! default so a partial file is fine. Two environment variables override the
//! RPC endpoints.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, WalletError};
use crate::rpc::SolanaNetwork;

pub const RPC_URL_ENV: &str = "SOLANA_WALLET_RPC_URL";
pub const FALLBACK_RPC_URL_ENV: &str = "SOLANA_WALLET_FALLBACK_RPC_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub rpc: RpcConfig,
    pub confirmation: ConfirmationConfig,
    pub swap: SwapConfig,
    /// Directory for the file-backed secure store
    pub storage_dir: Option<PathBuf>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            confirmation: ConfirmationConfig::default(),
            swap: SwapConfig::default(),
            storage_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub primary_url: String,
    pub fallback_url: Option<String>,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
    pub request_timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub health_interval_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            primary_url: SolanaNetwork::Mainnet.rpc_url(),
            fallback_url: None,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_ms: 1_000,
            request_timeout_secs: 30,
            health_timeout_secs: 3,
            health_interval_secs: 30,
        }
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    /// Attempts after which block height is checked against the context
    pub expiry_check_after: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_attempts: 30,
            expiry_check_after: 10,
        }
    }
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    pub aggregator_url: String,
    pub default_slippage_bps: u16,
    pub native_amm_enabled: bool,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            aggregator_url: "https://quote-api.jup.ag/v6".to_string(),
            default_slippage_bps: 50,
            native_amm_enabled: true,
        }
    }
}

impl WalletConfig {
    /// Get default config directory (`~/.solana-wallet`)
    pub fn default_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| WalletError::Storage("Could not find home directory".to_string()))?;
        Ok(home.join(".solana-wallet"))
    }

    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        let path = Self::default_dir()?.join("config.json");
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read(path.as_ref())?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Apply endpoint overrides from the environment
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(RPC_URL_ENV) {
            if !url.trim().is_empty() {
                self.rpc.primary_url = url;
            }
        }
        if let Ok(url) = std::env::var(FALLBACK_RPC_URL_ENV) {
            if !url.trim().is_empty() {
                self.rpc.fallback_url = Some(url);
            }
        }
    }

    /// Storage directory, defaulting to the config directory
    pub fn storage_dir(&self) -> Result<PathBuf> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"rpc": {"primary_url": "https://api.devnet.solana.com", "max_retries": 5}}"#,
        )
        .unwrap();

        let config = WalletConfig::from_file(&path).unwrap();
        assert_eq!(config.rpc.primary_url, "https://api.devnet.solana.com");
        assert_eq!(config.rpc.max_retries, 5);
        assert_eq!(config.rpc.max_delay_ms, 10_000);
        assert_eq!(config.confirmation.max_attempts, 30);
        assert_eq!(config.swap.default_slippage_bps, 50);
    }
}
