//! Thought miner - command-line Cuckoo Cycle miner.
//!
//! This is the main entry point for the thought-miner binary.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thought_consensus::difficulty::DifficultyEngine;
use thought_consensus::target::CompactTarget;
use thought_consensus::{check_pow_at_height, BlockHeader, ConsensusParams};
use thought_mining::Miner;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod config;

use config::MinerConfig;

/// Cuckoo Cycle miner for the Thought blockchain.
#[derive(Parser, Debug)]
#[command(name = "thought-miner")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "thought-miner.toml")]
    config: PathBuf,

    /// Network (mainnet, testnet, devnet, regtest)
    #[arg(short, long)]
    network: Option<String>,

    /// Number of mining threads (0 = auto-detect)
    #[arg(long)]
    threads: Option<usize>,

    /// First header nonce to try
    #[arg(long)]
    start_nonce: Option<u32>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mine a cuckoo header
    Mine(MineArgs),
    /// Print the consensus parameters of the configured network
    Params {
        /// Also show the retarget rule and ceiling for this height
        #[arg(long)]
        height: Option<u32>,
    },
}

#[derive(clap::Args, Debug)]
struct MineArgs {
    /// Height of the block being mined
    #[arg(long, default_value = "1")]
    height: u32,

    /// Previous block hash (hex, as displayed)
    #[arg(long)]
    prev_block: Option<String>,

    /// Merkle root (hex, as displayed)
    #[arg(long)]
    merkle_root: Option<String>,

    /// Block time (defaults to now)
    #[arg(long)]
    time: Option<u32>,

    /// Compact target, e.g. 0x2000ffff (defaults to the network ceiling)
    #[arg(long)]
    bits: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_names(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Thought miner v{}", env!("CARGO_PKG_VERSION"));

    let config = MinerConfig::load(&args.config, &args)?;
    let params = Arc::new(config.consensus_params()?);
    info!("Network: {}", params.network);

    match &args.command {
        Command::Params { height } => print_params(&params, *height),
        Command::Mine(mine) => mine_block(&config, params, mine).await?,
    }

    Ok(())
}

async fn mine_block(config: &MinerConfig, params: Arc<ConsensusParams>, args: &MineArgs) -> Result<()> {
    let height = args.height;
    if !params.is_cuckoo_fork_active(height) {
        bail!(
            "cuckoo blocks are not allowed before height {}",
            params.cuckoo_hard_fork_height
        );
    }

    let mut header = BlockHeader {
        time: args.time.unwrap_or_else(unix_now),
        bits: match &args.bits {
            Some(bits) => parse_bits(bits)?,
            None => params.pow_limit_compact_for_height(height),
        },
        ..Default::default()
    };
    if let Some(prev) = &args.prev_block {
        header.prev_block = parse_hash(prev).context("Invalid --prev-block")?;
    }
    if let Some(root) = &args.merkle_root {
        header.merkle_root = parse_hash(root).context("Invalid --merkle-root")?;
    }
    header.set_cuckoo_pow(true);

    let miner = Arc::new(Miner::new(config.miner_options(), Arc::clone(&params)));
    miner.start();

    // Handle shutdown signals
    let stopper = Arc::clone(&miner);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            stopper.stop();
        }
    });

    let found = miner.mine(header, height).await.context("Mining failed")?;
    let header = found.header;
    check_pow_at_height(&header, &header.hash(), header.bits, height, &params)
        .context("Mined header failed validation")?;

    let stats = miner.stats();
    println!("height:      {}", height);
    println!("nonce:       {}", header.nonce);
    println!("bits:        {}", CompactTarget(header.bits));
    println!("hash:        {}", header.hash_hex());
    println!("proof:       {:?}", header.cuckoo_proof);
    println!("graphs:      {}", stats.graphs_searched);
    println!("header hex:  {}", hex::encode(header.serialize()));

    Ok(())
}

fn print_params(params: &ConsensusParams, height: Option<u32>) {
    println!("network:                 {}", params.network);
    println!("target spacing:          {}s", params.pow_target_spacing);
    println!("target timespan:         {}s", params.pow_target_timespan);
    println!("adjustment interval:     {}", params.difficulty_adjustment_interval());
    println!("graph size:              {}", params.cuckoo_graph_size());
    println!("pow limit:               {:064x}", params.pow_limit());
    println!("cuckoo pow limit:        {:064x}", params.cuckoo_pow_limit());
    println!("cuckoo fork height:      {}", params.cuckoo_hard_fork_height);
    println!("cuckoo required height:  {}", params.cuckoo_required_height);
    println!("midas start height:      {}", params.midas_start_height);
    println!("kgw height:              {}", params.kgw_height);
    println!("dgw height:              {}", params.dgw_height);
    println!("min difficulty blocks:   {}", params.allow_min_difficulty_blocks);
    println!("no retargeting:          {}", params.no_retargeting);

    if let Some(height) = height {
        let engine = DifficultyEngine::new(params);
        println!();
        println!("at height {}:", height);
        println!(
            "  retarget rule:         {}",
            engine.algorithm_for(height.saturating_sub(1))
        );
        println!(
            "  ceiling:               {}",
            CompactTarget(params.pow_limit_compact_for_height(height))
        );
        println!("  cuckoo allowed:        {}", params.is_cuckoo_fork_active(height));
        println!("  cuckoo required:       {}", params.is_cuckoo_required(height));
    }
}

/// Parse a displayed (big-endian) hash into internal byte order.
fn parse_hash(s: &str) -> Result<[u8; 32]> {
    let s = s.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).context("not hex")?;
    let mut hash: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| anyhow::anyhow!("expected 32 bytes, got {}", b.len()))?;
    hash.reverse();
    Ok(hash)
}

fn parse_bits(s: &str) -> Result<u32> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u32::from_str_radix(digits, 16).with_context(|| format!("Invalid compact target '{}'", s))
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
