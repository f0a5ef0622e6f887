//! Node configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network (mainnet, testnet, regtest).
    pub network: String,
    /// Mining configuration.
    #[serde(default)]
    pub mining: MiningConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            network: "mainnet".to_string(),
            mining: MiningConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file; a missing file yields the
    /// defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Mining configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Start mining at boot.
    #[serde(default)]
    pub generate: bool,
    /// Worker threads; negative selects hardware concurrency.
    #[serde(default = "default_threads")]
    pub threads: i32,
    /// Mining algorithm (scrypt, sha256d, equihash).
    #[serde(default = "default_algo")]
    pub algo: String,
    /// Largest block to create, in bytes.
    #[serde(default = "default_block_max_size")]
    pub block_max_size: u32,
    /// Bytes reserved for high-priority transactions.
    #[serde(default = "default_block_priority_size")]
    pub block_priority_size: u32,
    /// Minimum block size to fill with free transactions.
    #[serde(default)]
    pub block_min_size: u32,
    /// Log per-transaction priority lines during template builds.
    #[serde(default)]
    pub print_priority: bool,
}

fn default_threads() -> i32 {
    -1
}

fn default_algo() -> String {
    "scrypt".to_string()
}

fn default_block_max_size() -> u32 {
    bitmark_chain::DEFAULT_BLOCK_MAX_SIZE
}

fn default_block_priority_size() -> u32 {
    bitmark_chain::DEFAULT_BLOCK_PRIORITY_SIZE
}

impl Default for MiningConfig {
    fn default() -> Self {
        MiningConfig {
            generate: false,
            threads: default_threads(),
            algo: default_algo(),
            block_max_size: default_block_max_size(),
            block_priority_size: default_block_priority_size(),
            block_min_size: bitmark_chain::DEFAULT_BLOCK_MIN_SIZE,
            print_priority: false,
        }
    }
}
