//! Miner configuration.

use crate::Args;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use thought_consensus::{ChainParamsConfig, ConsensusParams, Network};
use thought_mining::MinerOptions;

/// Complete miner configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Network (mainnet, testnet, devnet, regtest).
    pub network: String,
    /// Number of mining threads (0 = auto-detect based on CPU cores).
    pub threads: usize,
    /// First header nonce. Random when unset.
    pub start_nonce: Option<u32>,
    /// Overrides applied on top of the network's built-in parameters.
    pub chain: Option<ChainParamsConfig>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            network: "mainnet".to_string(),
            threads: 0,
            start_nonce: None,
            chain: None,
        }
    }
}

impl MinerConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config: Self = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        // Only override if explicitly provided via CLI
        if let Some(ref network) = args.network {
            config.network = network.clone();
        }
        if let Some(threads) = args.threads {
            config.threads = threads;
        }
        if let Some(start_nonce) = args.start_nonce {
            config.start_nonce = Some(start_nonce);
        }

        Ok(config)
    }

    /// Consensus parameters for the configured network and overrides.
    pub fn consensus_params(&self) -> Result<ConsensusParams> {
        let network: Network = self.network.parse().context("Invalid network")?;
        let params = match &self.chain {
            Some(chain) => ConsensusParams::from_config(network, chain)
                .context("Invalid [chain] section")?,
            None => ConsensusParams::for_network(network),
        };
        Ok(params)
    }

    /// Worker thread count, resolving 0 to the available parallelism.
    pub fn mining_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Options for the miner.
    pub fn miner_options(&self) -> MinerOptions {
        MinerOptions {
            threads: self.mining_threads(),
            start_nonce: self.start_nonce,
        }
    }
}
