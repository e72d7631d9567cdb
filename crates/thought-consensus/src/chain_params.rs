//! Network consensus parameters.
//!
//! Parameters are an immutable value built once at startup and passed by
//! reference to every validation and retarget call:
//! - `ConsensusParams::mainnet()` / `testnet()` / `devnet()` / `regtest()`
//!   for the built-in networks
//! - `ConsensusParams::from_config()` to overlay a `[chain]` config section on
//!   one of them, for private and test networks

use crate::cuckoo::{GraphParams, MAX_GRAPH_SIZE};
use crate::target::{encode_compact, max_target, target_from_hex};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Built-in network selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

impl FromStr for Network {
    type Err = ChainParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Mainnet),
            "test" | "testnet" => Ok(Network::Testnet),
            "dev" | "devnet" => Ok(Network::Devnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(ChainParamsError {
                field: "network",
                message: format!("unknown network '{}'", other),
            }),
        }
    }
}

/// Error when constructing ConsensusParams from configuration.
#[derive(Debug, Clone)]
pub struct ChainParamsError {
    /// The field that is missing or invalid.
    pub field: &'static str,
    /// Description of the error.
    pub message: String,
}

impl fmt::Display for ChainParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusParams error for '{}': {}", self.field, self.message)
    }
}

impl std::error::Error for ChainParamsError {}

/// Overrides for a base network, loaded from the `[chain]` section of a
/// config file.
///
/// All fields are optional; an absent field keeps the base network's value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChainParamsConfig {
    /// Nominal block interval in seconds.
    pub target_spacing_secs: Option<i64>,
    /// Classical retarget window in seconds.
    pub target_timespan_secs: Option<i64>,
    /// Classical ceiling as big-endian hex.
    pub pow_limit_hex: Option<String>,
    /// Cuckoo ceiling as big-endian hex.
    pub cuckoo_pow_limit_hex: Option<String>,
    /// Cuckoo graph size in bits.
    pub cuckoo_graph_size: Option<u32>,
    pub allow_min_difficulty_blocks: Option<bool>,
    pub no_retargeting: Option<bool>,
    pub kgw_height: Option<u32>,
    pub dgw_height: Option<u32>,
    pub midas_start_height: Option<u32>,
    pub cuckoo_hard_fork_height: Option<u32>,
    pub cuckoo_required_height: Option<u32>,
    /// Genesis block time, the anchor of the MIDAS/DGW schedule.
    pub genesis_time: Option<i64>,
    /// Blocks mined at the ceiling before retargeting starts.
    pub min_difficulty_blocks: Option<u32>,
}

/// Network-specific consensus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusParams {
    /// Which built-in network these parameters started from.
    pub network: Network,

    /// Nominal block interval in seconds.
    pub pow_target_spacing: i64,

    /// Classical retarget window in seconds.
    pub pow_target_timespan: i64,

    /// Easiest target for classical hash-target blocks.
    pow_limit: BigUint,

    /// Easiest target for cuckoo blocks.
    cuckoo_pow_limit: BigUint,

    /// Cuckoo graph size in bits, always within `1..=MAX_GRAPH_SIZE`.
    cuckoo_graph_size: u32,

    /// Test networks: allow ceiling-difficulty blocks after a long gap.
    pub allow_min_difficulty_blocks: bool,

    /// Classical retarget keeps the previous bits.
    pub no_retargeting: bool,

    /// Kimoto Gravity Well activation height. Every built-in network
    /// activates MIDAS or DGW first, so this height is never reached.
    pub kgw_height: u32,

    /// Dark Gravity Wave activation height.
    pub dgw_height: u32,

    /// MIDAS activation height.
    pub midas_start_height: u32,

    /// First height at which cuckoo blocks are permitted and the cuckoo
    /// ceiling applies.
    pub cuckoo_hard_fork_height: u32,

    /// First height at which cuckoo blocks are mandatory.
    pub cuckoo_required_height: u32,

    /// Genesis block time in unix seconds.
    pub genesis_time: i64,

    /// Blocks at the start of the chain mined at the ceiling (dev networks).
    pub min_difficulty_blocks: u32,
}

const MAINNET_POW_LIMIT: &str = "00000000ffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
const MAINNET_CUCKOO_POW_LIMIT: &str =
    "00ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
const DEVNET_POW_LIMIT: &str = "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
const DEVNET_CUCKOO_POW_LIMIT: &str =
    "efffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

fn builtin_limit(hex: &str) -> BigUint {
    target_from_hex(hex).expect("valid built-in pow limit hex")
}

impl ConsensusParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            pow_target_spacing: 97,     // 1.618 minutes
            pow_target_timespan: 139_795, // 1.618 days
            pow_limit: builtin_limit(MAINNET_POW_LIMIT),
            cuckoo_pow_limit: builtin_limit(MAINNET_CUCKOO_POW_LIMIT),
            cuckoo_graph_size: 24,
            allow_min_difficulty_blocks: false,
            no_retargeting: false,
            kgw_height: 15_200,
            dgw_height: 642_605,
            midas_start_height: 1,
            cuckoo_hard_fork_height: 246_500,
            cuckoo_required_height: 248_800,
            // Mainnet never anchored its schedule to the genesis block.
            genesis_time: 0,
            min_difficulty_blocks: 0,
        }
    }

    /// Public testnet parameters.
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            pow_target_spacing: 97,
            pow_target_timespan: 139_795,
            pow_limit: builtin_limit(MAINNET_POW_LIMIT),
            cuckoo_pow_limit: builtin_limit(MAINNET_CUCKOO_POW_LIMIT),
            cuckoo_graph_size: 24,
            allow_min_difficulty_blocks: true,
            no_retargeting: false,
            kgw_height: 4_002,
            dgw_height: 208_000,
            midas_start_height: 2,
            cuckoo_hard_fork_height: 44,
            cuckoo_required_height: 100,
            genesis_time: 1_521_039_602,
            min_difficulty_blocks: 0,
        }
    }

    /// Developer network parameters: cuckoo and DGW from the first block.
    pub fn devnet() -> Self {
        Self {
            network: Network::Devnet,
            pow_target_spacing: 97,
            pow_target_timespan: 86_400, // 1 day
            pow_limit: builtin_limit(DEVNET_POW_LIMIT),
            cuckoo_pow_limit: builtin_limit(DEVNET_CUCKOO_POW_LIMIT),
            cuckoo_graph_size: 24,
            allow_min_difficulty_blocks: true,
            no_retargeting: false,
            kgw_height: 1,
            dgw_height: 1,
            midas_start_height: 0,
            cuckoo_hard_fork_height: 0,
            cuckoo_required_height: 0,
            genesis_time: 1_521_040_440,
            min_difficulty_blocks: 0,
        }
    }

    /// Regression test parameters: fixed difficulty under the classical rule.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            pow_target_spacing: 97,
            pow_target_timespan: 86_400,
            pow_limit: builtin_limit(DEVNET_POW_LIMIT),
            cuckoo_pow_limit: builtin_limit(DEVNET_CUCKOO_POW_LIMIT),
            cuckoo_graph_size: 24,
            allow_min_difficulty_blocks: true,
            no_retargeting: true,
            kgw_height: 15_200,
            dgw_height: 642_605,
            midas_start_height: 2,
            cuckoo_hard_fork_height: 2_010,
            cuckoo_required_height: 2_010,
            genesis_time: 1_512_658_235,
            min_difficulty_blocks: 0,
        }
    }

    /// Parameters for a built-in network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Devnet => Self::devnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Overlay configuration on a built-in network.
    ///
    /// Returns an error naming the specific field if any override is invalid.
    /// Hex ceilings are trimmed and accept an optional "0x" prefix.
    pub fn from_config(base: Network, config: &ChainParamsConfig) -> Result<Self, ChainParamsError> {
        let mut params = Self::for_network(base);

        if let Some(spacing) = config.target_spacing_secs {
            if spacing <= 0 {
                return Err(ChainParamsError {
                    field: "target_spacing_secs",
                    message: format!("must be positive, got {}", spacing),
                });
            }
            params.pow_target_spacing = spacing;
        }
        if let Some(timespan) = config.target_timespan_secs {
            params.pow_target_timespan = timespan;
        }
        if params.pow_target_timespan < params.pow_target_spacing {
            return Err(ChainParamsError {
                field: "target_timespan_secs",
                message: format!(
                    "timespan {} shorter than spacing {}",
                    params.pow_target_timespan, params.pow_target_spacing
                ),
            });
        }

        if let Some(hex) = &config.pow_limit_hex {
            params.pow_limit = parse_limit("pow_limit_hex", hex)?;
        }
        if let Some(hex) = &config.cuckoo_pow_limit_hex {
            params.cuckoo_pow_limit = parse_limit("cuckoo_pow_limit_hex", hex)?;
        }

        if let Some(graph_size) = config.cuckoo_graph_size {
            if !(1..=MAX_GRAPH_SIZE).contains(&graph_size) {
                return Err(ChainParamsError {
                    field: "cuckoo_graph_size",
                    message: format!("must be in 1..={}, got {}", MAX_GRAPH_SIZE, graph_size),
                });
            }
            params.cuckoo_graph_size = graph_size;
        }

        params.allow_min_difficulty_blocks = config
            .allow_min_difficulty_blocks
            .unwrap_or(params.allow_min_difficulty_blocks);
        params.no_retargeting = config.no_retargeting.unwrap_or(params.no_retargeting);
        params.kgw_height = config.kgw_height.unwrap_or(params.kgw_height);
        params.dgw_height = config.dgw_height.unwrap_or(params.dgw_height);
        params.midas_start_height = config.midas_start_height.unwrap_or(params.midas_start_height);
        params.cuckoo_hard_fork_height = config
            .cuckoo_hard_fork_height
            .unwrap_or(params.cuckoo_hard_fork_height);
        params.cuckoo_required_height = config
            .cuckoo_required_height
            .unwrap_or(params.cuckoo_required_height);
        params.genesis_time = config.genesis_time.unwrap_or(params.genesis_time);
        params.min_difficulty_blocks = config
            .min_difficulty_blocks
            .unwrap_or(params.min_difficulty_blocks);

        if params.cuckoo_required_height < params.cuckoo_hard_fork_height {
            return Err(ChainParamsError {
                field: "cuckoo_required_height",
                message: format!(
                    "required height {} precedes fork height {}",
                    params.cuckoo_required_height, params.cuckoo_hard_fork_height
                ),
            });
        }

        Ok(params)
    }

    /// Set the number of leading blocks mined at the ceiling.
    pub fn with_min_difficulty_blocks(mut self, blocks: u32) -> Self {
        self.min_difficulty_blocks = blocks;
        self
    }

    /// Classical ceiling.
    pub fn pow_limit(&self) -> &BigUint {
        &self.pow_limit
    }

    /// Cuckoo ceiling.
    pub fn cuckoo_pow_limit(&self) -> &BigUint {
        &self.cuckoo_pow_limit
    }

    /// Ceiling for the primitive a header claims.
    pub fn pow_limit_for_primitive(&self, cuckoo: bool) -> &BigUint {
        if cuckoo {
            &self.cuckoo_pow_limit
        } else {
            &self.pow_limit
        }
    }

    /// The ceiling in force for a block at `height`.
    ///
    /// This is the only place the fork height selects a ceiling; retargeting
    /// and validation both go through it.
    pub fn pow_limit_for_height(&self, height: u32) -> &BigUint {
        self.pow_limit_for_primitive(self.is_cuckoo_fork_active(height))
    }

    /// Compact form of [`Self::pow_limit_for_height`].
    pub fn pow_limit_compact_for_height(&self, height: u32) -> u32 {
        encode_compact(self.pow_limit_for_height(height))
    }

    /// Blocks per classical retarget window.
    pub fn difficulty_adjustment_interval(&self) -> i64 {
        self.pow_target_timespan / self.pow_target_spacing
    }

    /// Whether cuckoo blocks are permitted at `height`.
    pub fn is_cuckoo_fork_active(&self, height: u32) -> bool {
        height >= self.cuckoo_hard_fork_height
    }

    /// Whether cuckoo blocks are mandatory at `height`.
    pub fn is_cuckoo_required(&self, height: u32) -> bool {
        height >= self.cuckoo_required_height
    }

    /// Cuckoo graph size in bits.
    pub fn cuckoo_graph_size(&self) -> u32 {
        self.cuckoo_graph_size
    }

    /// Graph constants for this network.
    pub fn graph_params(&self) -> GraphParams {
        GraphParams::new(self.cuckoo_graph_size)
    }
}

fn parse_limit(field: &'static str, hex: &str) -> Result<BigUint, ChainParamsError> {
    let limit = target_from_hex(hex).ok_or_else(|| ChainParamsError {
        field,
        message: format!("invalid hex string: '{}'", hex),
    })?;
    if limit.is_zero() {
        return Err(ChainParamsError {
            field,
            message: "limit cannot be zero".to_string(),
        });
    }
    if limit > max_target() {
        return Err(ChainParamsError {
            field,
            message: "limit exceeds 256 bits".to_string(),
        });
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let params = ConsensusParams::mainnet();
        assert_eq!(params.pow_target_spacing, 97);
        assert_eq!(params.pow_target_timespan, 139_795);
        assert_eq!(params.difficulty_adjustment_interval(), 1441);
        assert_eq!(params.cuckoo_graph_size(), 24);
        assert_eq!(params.cuckoo_hard_fork_height, 246_500);
        assert_eq!(params.cuckoo_required_height, 248_800);
        assert_eq!(encode_compact(params.pow_limit()), 0x1d00ffff);
        assert_eq!(encode_compact(params.cuckoo_pow_limit()), 0x2000ffff);
        assert!(!params.allow_min_difficulty_blocks);
        assert_eq!(params.genesis_time, 0);
    }

    #[test]
    fn test_devnet_and_regtest_params() {
        let devnet = ConsensusParams::devnet();
        assert_eq!(devnet.difficulty_adjustment_interval(), 890);
        assert_eq!(encode_compact(devnet.pow_limit()), 0x207fffff);
        assert!(devnet.is_cuckoo_fork_active(0));
        assert!(devnet.is_cuckoo_required(0));

        let regtest = ConsensusParams::regtest();
        assert!(regtest.no_retargeting);
        assert!(!regtest.is_cuckoo_fork_active(2_009));
        assert!(regtest.is_cuckoo_fork_active(2_010));
    }

    #[test]
    fn test_ceiling_for_height() {
        let params = ConsensusParams::mainnet();
        assert_eq!(params.pow_limit_for_height(246_499), params.pow_limit());
        assert_eq!(params.pow_limit_for_height(246_500), params.cuckoo_pow_limit());
        assert_eq!(params.pow_limit_compact_for_height(0), 0x1d00ffff);
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("main".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!(" Testnet ".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        let err = "moon".parse::<Network>().unwrap_err();
        assert_eq!(err.field, "network");
    }

    #[test]
    fn test_from_config_empty_keeps_base() {
        let params =
            ConsensusParams::from_config(Network::Testnet, &ChainParamsConfig::default()).unwrap();
        assert_eq!(params, ConsensusParams::testnet());
    }

    #[test]
    fn test_from_config_overrides() {
        let config = ChainParamsConfig {
            pow_limit_hex: Some(format!("  0x0000ffff{} ", "0".repeat(56))),
            cuckoo_graph_size: Some(16),
            min_difficulty_blocks: Some(4000),
            ..Default::default()
        };
        let params = ConsensusParams::from_config(Network::Devnet, &config).unwrap();
        assert_eq!(params.cuckoo_graph_size(), 16);
        assert_eq!(params.min_difficulty_blocks, 4000);
        assert_eq!(encode_compact(params.pow_limit()), 0x1f00ffff);
    }

    #[test]
    fn test_from_config_invalid_hex() {
        let config = ChainParamsConfig {
            cuckoo_pow_limit_hex: Some("not-hex".into()),
            ..Default::default()
        };
        let err = ConsensusParams::from_config(Network::Mainnet, &config).unwrap_err();
        assert_eq!(err.field, "cuckoo_pow_limit_hex");
        assert!(err.message.contains("invalid hex"));
    }

    #[test]
    fn test_from_config_rejects_zero_and_wide_limits() {
        let zero = ChainParamsConfig {
            pow_limit_hex: Some("0x00".into()),
            ..Default::default()
        };
        assert!(ConsensusParams::from_config(Network::Mainnet, &zero).is_err());

        let wide = ChainParamsConfig {
            pow_limit_hex: Some(format!("1{}", "0".repeat(64))),
            ..Default::default()
        };
        let err = ConsensusParams::from_config(Network::Mainnet, &wide).unwrap_err();
        assert!(err.message.contains("256 bits"));
    }

    #[test]
    fn test_from_config_graph_size_bounds() {
        for bad in [0, 32] {
            let config = ChainParamsConfig {
                cuckoo_graph_size: Some(bad),
                ..Default::default()
            };
            let err = ConsensusParams::from_config(Network::Regtest, &config).unwrap_err();
            assert_eq!(err.field, "cuckoo_graph_size");
        }
    }

    #[test]
    fn test_graph_size_always_buildable() {
        let mut all = vec![
            ConsensusParams::mainnet(),
            ConsensusParams::testnet(),
            ConsensusParams::devnet(),
            ConsensusParams::regtest(),
        ];
        for size in [1, MAX_GRAPH_SIZE] {
            let config = ChainParamsConfig {
                cuckoo_graph_size: Some(size),
                ..Default::default()
            };
            all.push(ConsensusParams::from_config(Network::Devnet, &config).unwrap());
        }
        for params in all {
            let graph = params.graph_params();
            assert_eq!(graph.graph_size, params.cuckoo_graph_size());
            assert_eq!(graph.nnodes, 1u32 << params.cuckoo_graph_size());
        }
    }

    #[test]
    fn test_from_config_spacing_and_heights() {
        let config = ChainParamsConfig {
            target_spacing_secs: Some(0),
            ..Default::default()
        };
        assert!(ConsensusParams::from_config(Network::Mainnet, &config).is_err());

        let config = ChainParamsConfig {
            cuckoo_hard_fork_height: Some(500),
            cuckoo_required_height: Some(100),
            ..Default::default()
        };
        let err = ConsensusParams::from_config(Network::Mainnet, &config).unwrap_err();
        assert_eq!(err.field, "cuckoo_required_height");
    }

    #[test]
    fn test_with_min_difficulty_blocks() {
        let params = ConsensusParams::devnet().with_min_difficulty_blocks(4000);
        assert_eq!(params.min_difficulty_blocks, 4000);
    }
}
