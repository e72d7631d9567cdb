//! Test data generators for integration tests.
//!
//! Provides small-graph consensus parameters, solved and deliberately broken
//! cuckoo headers, and ancestor chains with controlled block timing.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thought_consensus::cuckoo::derive_key;
use thought_consensus::difficulty::HeaderChain;
use thought_consensus::params::PROOF_SIZE;
use thought_consensus::{BlockHeader, ChainParamsConfig, ConsensusParams, Network, Proof};
use thought_mining::CuckooSolver;

/// Compact target inside every built-in cuckoo ceiling on test networks.
pub const EASY_CUCKOO_BITS: u32 = 0x2100efff;

/// Header nonces tried before a generator gives up.
const MAX_HEADER_NONCES: u32 = 4096;

/// Devnet parameters with a smaller cuckoo graph.
pub fn small_graph_params(graph_size: u32) -> ConsensusParams {
    let config = ChainParamsConfig {
        cuckoo_graph_size: Some(graph_size),
        ..Default::default()
    };
    ConsensusParams::from_config(Network::Devnet, &config)
        .unwrap_or_else(|e| panic!("graph size {} rejected: {}", graph_size, e))
}

/// Deterministic merkle root for a seed.
pub fn test_merkle_root(seed: u64) -> [u8; 32] {
    Sha256::digest(seed.to_le_bytes()).into()
}

/// Cuckoo-flagged header with the given target and a seeded merkle root.
pub fn cuckoo_header(bits: u32, seed: u64) -> BlockHeader {
    let mut header = BlockHeader {
        merkle_root: test_merkle_root(seed),
        time: 1_521_040_440 + (seed % 100_000) as u32,
        bits,
        ..Default::default()
    };
    header.set_cuckoo_pow(true);
    header
}

/// Walk header nonces from `header.nonce` until the graph holds a 42-cycle.
///
/// The proof is written into the header but not checked against its target.
pub fn solve_graph(graph_size: u32, mut header: BlockHeader) -> BlockHeader {
    let mut solver = CuckooSolver::new(graph_size);
    for _ in 0..MAX_HEADER_NONCES {
        solver.set_header(&header);
        if let Some(proof) = solver.next_solution().expect("solver fault on small graph") {
            header.cuckoo_proof = proof;
            return header;
        }
        header.nonce += 1;
    }
    panic!("no 42-cycle within {} header nonces", MAX_HEADER_NONCES);
}

/// A header carrying 42 ascending edges that form two disjoint shorter
/// cycles. Every endpoint appears exactly twice, so the proof passes the
/// endpoint check and fails on cycle length.
pub fn split_cycle_header(graph_size: u32, mut header: BlockHeader) -> BlockHeader {
    let mut solver = CuckooSolver::new(graph_size);
    let graph = *solver.graph();

    for _ in 0..MAX_HEADER_NONCES {
        let keys = derive_key(&header);
        for first_len in (2..=PROOF_SIZE / 2).step_by(2) {
            solver.set_header(&header);
            let Ok(Some(first)) = solver.next_cycle(first_len) else {
                continue;
            };
            solver.set_header(&header);
            let Ok(Some(second)) = solver.next_cycle(PROOF_SIZE - first_len) else {
                continue;
            };

            let endpoints = |cycle: &[u32]| -> HashSet<u32> {
                cycle
                    .iter()
                    .flat_map(|&n| {
                        let (u, v) = graph.edge(&keys, n);
                        [u, v]
                    })
                    .collect()
            };
            if !endpoints(&first).is_disjoint(&endpoints(&second)) {
                continue;
            }

            let mut nonces: Vec<u32> = first.into_iter().chain(second).collect();
            nonces.sort_unstable();
            header.cuckoo_proof.copy_from_slice(&nonces);
            return header;
        }
        header.nonce += 1;
    }
    panic!("no disjoint cycle pair within {} header nonces", MAX_HEADER_NONCES);
}

/// Copy of `proof` with entries `i` and `j` swapped.
pub fn swapped(proof: &Proof, i: usize, j: usize) -> Proof {
    let mut out = *proof;
    out.swap(i, j);
    out
}

/// Chain of `blocks` blocks from genesis, `spacing` seconds apart.
pub fn uniform_chain(blocks: u32, start_time: i64, spacing: i64, bits: u32) -> HeaderChain {
    let mut chain = HeaderChain::new();
    for i in 0..blocks {
        chain.push(start_time + i64::from(i) * spacing, bits);
    }
    chain
}

/// Chain from genesis with the given gaps between consecutive blocks.
pub fn chain_with_intervals(start_time: i64, intervals: &[i64], bits: u32) -> HeaderChain {
    let mut chain = HeaderChain::new();
    let mut time = start_time;
    chain.push(time, bits);
    for interval in intervals {
        time += interval;
        chain.push(time, bits);
    }
    chain
}

/// Consensus parameters with MIDAS and DGW pushed out of reach, leaving the
/// classical rule in force.
pub fn classical_params(base: Network, allow_min: bool, no_retargeting: bool) -> ConsensusParams {
    let config = ChainParamsConfig {
        midas_start_height: Some(u32::MAX),
        dgw_height: Some(u32::MAX),
        kgw_height: Some(u32::MAX),
        allow_min_difficulty_blocks: Some(allow_min),
        no_retargeting: Some(no_retargeting),
        ..Default::default()
    };
    ConsensusParams::from_config(base, &config)
        .unwrap_or_else(|e| panic!("classical overlay rejected: {}", e))
}
