//! # thought-consensus
//!
//! Proof-of-work consensus rules for the Thought blockchain.
//!
//! This crate provides:
//! - Cuckoo Cycle graph key derivation, edge generation and proof verification
//! - Proof-of-work validation for both the classical hash-target primitive
//!   and the cycle-based primitive
//! - Difficulty retargeting (classical, MIDAS, Dark Gravity Wave, and the
//!   dormant Kimoto Gravity Well)
//! - Compact target (`nBits`) encoding and per-network consensus parameters
//!
//! ## Cuckoo Cycle
//!
//! A proof is 42 edge indices forming a single cycle in a bipartite graph whose
//! edges are generated by SipHash-2-4 keyed from the header. Key parameters:
//! - graph size 24 bits on every network (2^24 nodes, 2^23 per side)
//! - SHA-256 of the 80-byte header prefix as the SipHash key
//! - double SHA-256 of the proof compared against the block target
//!
//! ## Difficulty Adjustment
//!
//! The retarget algorithm is selected by height: classical fixed-interval
//! retargeting at first, then MIDAS, then Dark Gravity Wave over 24 blocks,
//! targeting 97-second block times.

pub mod cuckoo;
mod chain_params;
pub mod difficulty;
mod error;
mod header;
mod pow;
pub mod target;

pub use chain_params::{ChainParamsConfig, ChainParamsError, ConsensusParams, Network};
pub use cuckoo::{derive_key, verify, verify_header, GraphParams, SipKeys};
pub use difficulty::{AncestorChain, BlockSummary, DifficultyEngine, HeaderChain};
pub use error::{CycleError, PowError, PowResult, VerifyOutcome};
pub use header::{proof_to_bytes, sha256d, BlockHeader, Proof};
pub use pow::{check_pow, check_pow_at_height, cuckoo_proof_hash};
pub use target::CompactTarget;

/// Consensus constants shared by every network.
pub mod params {
    /// Number of edges in a Cuckoo Cycle proof.
    pub const PROOF_SIZE: usize = 42;

    /// Byte length of the canonical header prefix hashed into the graph key.
    pub const HEADER_SIZE: usize = 80;

    /// Solver path buffer length. Paths this long indicate a misconfigured
    /// graph size rather than an honest graph.
    pub const MAX_PATH_LEN: usize = 8192;

    /// Version bit marking a header as carrying a Cuckoo Cycle proof.
    pub const CUCKOO_VERSION_MASK: u32 = 0x4000_0000;

    /// Number of past blocks averaged by Dark Gravity Wave.
    pub const DGW_PAST_BLOCKS: u32 = 24;

    /// Blocks after the cuckoo fork during which MIDAS returns the ceiling.
    pub const CUCKOO_FORK_RESET_BLOCKS: u32 = 50;
}
