use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dotenv::dotenv;
use serde::Deserialize;
use solana_sdk::signature::{read_keypair_file, Keypair};
use thiserror::Error;

use crate::engine::DEFAULT_CONFIRM_TIMEOUT;
use crate::error::{SwapError, SwapResult};
use crate::jupiter::DEFAULT_SWAP_API;
use crate::rpc::{DEFAULT_RPC_URL, DEFAULT_WSS_URL};

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["swap-tool.toml", "config/swap-tool.toml"];
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

// ─────────────────── Configuration ───────────────────

/// Everything a swap run reads, resolved once and passed by value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapConfig {
    pub swap_api_url: String,
    pub api_key: Option<String>,
    pub rpc_url: String,
    pub wss_url: String,
    pub simulate: bool,
    /// 0 leaves slippage to the routing service.
    pub slippage_bps: u16,
    pub confirm_timeout: Duration,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            swap_api_url: DEFAULT_SWAP_API.to_string(),
            api_key: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            wss_url: DEFAULT_WSS_URL.to_string(),
            simulate: true,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }
}

/// One source of settings; unset keys fall through to the next layer.
///
/// The same keys are used by the config file, the environment and the flags.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub swap_api: Option<String>,
    pub api_key: Option<String>,
    pub chain_rpc: Option<String>,
    pub chain_wss: Option<String>,
    pub simulate: Option<bool>,
    pub slippage_bps: Option<u16>,
    /// seconds
    pub timeout: Option<u64>,
}

impl ConfigLayer {
    /// Keeps every key set in `self`, filling the rest from `lower`.
    pub fn over(self, lower: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            swap_api: self.swap_api.or(lower.swap_api),
            api_key: self.api_key.or(lower.api_key),
            chain_rpc: self.chain_rpc.or(lower.chain_rpc),
            chain_wss: self.chain_wss.or(lower.chain_wss),
            simulate: self.simulate.or(lower.simulate),
            slippage_bps: self.slippage_bps.or(lower.slippage_bps),
            timeout: self.timeout.or(lower.timeout),
        }
    }

    pub fn resolve(self) -> SwapConfig {
        let defaults = SwapConfig::default();
        SwapConfig {
            swap_api_url: self.swap_api.unwrap_or(defaults.swap_api_url),
            api_key: self.api_key.filter(|key| !key.is_empty()),
            rpc_url: self.chain_rpc.unwrap_or(defaults.rpc_url),
            wss_url: self.chain_wss.unwrap_or(defaults.wss_url),
            simulate: self.simulate.unwrap_or(defaults.simulate),
            slippage_bps: self.slippage_bps.unwrap_or(defaults.slippage_bps),
            confirm_timeout: self
                .timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.confirm_timeout),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Loads `.env` into the process environment; a missing file is fine.
pub fn load_env() {
    dotenv().ok();
}

/// Reads the first config file that exists, or an empty layer when none do.
pub fn load_config_file(path: Option<PathBuf>) -> Result<ConfigLayer, ConfigError> {
    let explicit = path.is_some();
    let candidates = match path {
        Some(p) => vec![p],
        None => DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect(),
    };

    for candidate in candidates {
        if !candidate.exists() && !explicit {
            continue;
        }
        return parse_file(&candidate);
    }
    Ok(ConfigLayer::default())
}

fn parse_file(path: &Path) -> Result<ConfigLayer, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ─────────────────── Keys ───────────────────

/// Keypair from base58 secret text, or from a keypair file when `key` names one.
pub fn load_keypair(key: &str) -> SwapResult<Keypair> {
    let path = Path::new(key);
    if path.is_file() {
        return read_keypair_file(path).map_err(|err| {
            SwapError::Validation(format!("failed to read keypair from {}: {err}", path.display()))
        });
    }
    keypair_from_base58(key)
}

pub fn keypair_from_base58(secret: &str) -> SwapResult<Keypair> {
    let bytes = bs58::decode(secret.trim()).into_vec().map_err(|_| {
        SwapError::Validation("invalid private key format, should be base58 encoded string".into())
    })?;
    Keypair::from_bytes(&bytes)
        .map_err(|err| SwapError::Validation(format!("invalid private key: {err}")))
}
