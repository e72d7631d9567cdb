//! Retarget scenario tests.
//!
//! Drives `DifficultyEngine` over generated ancestor chains on the built-in
//! networks and on overlays that pin a single algorithm.

use crate::generators::{chain_with_intervals, classical_params, uniform_chain};
use num_bigint::BigUint;
use thought_consensus::difficulty::{HeaderChain, RetargetAlgorithm};
use thought_consensus::target::{bits_to_target, encode_compact};
use thought_consensus::{
    BlockHeader, ChainParamsConfig, ConsensusParams, DifficultyEngine, Network,
};

// ============================================================================
// Minimum-difficulty Start
// ============================================================================

#[test]
fn test_genesis_successor_gets_ceiling_with_min_difficulty_blocks() {
    let params = ConsensusParams::testnet().with_min_difficulty_blocks(4000);
    assert!(params.allow_min_difficulty_blocks);

    let mut chain = HeaderChain::new();
    let genesis = chain.push(params.genesis_time, 0x1c0fffff);
    let candidate = BlockHeader {
        time: (params.genesis_time + 97) as u32,
        ..Default::default()
    };

    let engine = DifficultyEngine::new(&params);
    assert_eq!(engine.algorithm_for(0), RetargetAlgorithm::MinimumDifficulty);
    assert_eq!(
        engine.next_target(&chain, &genesis, &candidate).to_consensus(),
        params.pow_limit_compact_for_height(1)
    );
    assert_eq!(params.pow_limit_compact_for_height(1), 0x1d00ffff);
}

#[test]
fn test_min_difficulty_ceiling_follows_fork() {
    let params = ConsensusParams::testnet().with_min_difficulty_blocks(4000);
    let chain = uniform_chain(60, params.genesis_time, 97, 0x1c0fffff);
    let last = chain.tip().unwrap();
    let engine = DifficultyEngine::new(&params);
    // Past the testnet fork at 44 the cuckoo ceiling applies.
    assert_eq!(
        engine.next_work_required(&chain, &last, last.time + 97),
        encode_compact(params.cuckoo_pow_limit())
    );
}

// ============================================================================
// Classical Retarget
// ============================================================================

#[test]
fn test_half_timespan_at_boundary_halves_target() {
    let params = classical_params(Network::Devnet, false, false);
    let interval = params.difficulty_adjustment_interval() as u32;
    let bits = 0x1c0fffff;

    // Window of `interval` blocks spanning exactly half the timespan.
    let mut times = vec![0i64; interval as usize];
    let step = params.pow_target_timespan / 2 / i64::from(interval - 1);
    for (i, t) in times.iter_mut().enumerate() {
        *t = 1_000_000 + i as i64 * step;
    }
    let span = times[interval as usize - 1] - times[0];
    *times.last_mut().unwrap() += params.pow_target_timespan / 2 - span;

    let mut chain = HeaderChain::new();
    for time in &times {
        chain.push(*time, bits);
    }
    let last = chain.tip().unwrap();
    assert_eq!(i64::from(last.height + 1) % params.difficulty_adjustment_interval(), 0);

    let engine = DifficultyEngine::new(&params);
    assert_eq!(engine.algorithm_for(last.height), RetargetAlgorithm::Bitcoin);
    let next = engine.next_work_required(&chain, &last, last.time + 97);
    assert_eq!(next, encode_compact(&(bits_to_target(bits) / BigUint::from(2u32))));
}

#[test]
fn test_no_retargeting_keeps_bits_at_boundary() {
    let params = classical_params(Network::Devnet, false, true);
    let interval = params.difficulty_adjustment_interval() as u32;
    let engine = DifficultyEngine::new(&params);

    for spacing in [1i64, 97, 10_000] {
        let chain = uniform_chain(interval, 1_000_000, spacing, 0x1c0fffff);
        let last = chain.tip().unwrap();
        assert_eq!(
            engine.next_work_required(&chain, &last, last.time + spacing),
            0x1c0fffff
        );
    }
}

#[test]
fn test_classical_never_above_mainnet_ceiling() {
    let params = classical_params(Network::Mainnet, false, false);
    let interval = params.difficulty_adjustment_interval() as u32;
    // Slow window at the ceiling.
    let chain = uniform_chain(interval, 1_000_000, 97 * 8, 0x1d00ffff);
    let last = chain.tip().unwrap();
    let engine = DifficultyEngine::new(&params);
    assert_eq!(engine.next_work_required(&chain, &last, last.time + 97), 0x1d00ffff);
}

// ============================================================================
// Algorithm Selection
// ============================================================================

#[test]
fn test_mainnet_algorithm_schedule() {
    let params = ConsensusParams::mainnet();
    let engine = DifficultyEngine::new(&params);
    assert_eq!(engine.algorithm_for(0), RetargetAlgorithm::Midas);
    assert_eq!(engine.algorithm_for(642_603), RetargetAlgorithm::Midas);
    assert_eq!(engine.algorithm_for(642_604), RetargetAlgorithm::DarkGravityWave);
}

#[test]
fn test_devnet_uses_dgw_from_first_block() {
    let params = ConsensusParams::devnet();
    let engine = DifficultyEngine::new(&params);
    assert_eq!(engine.algorithm_for(0), RetargetAlgorithm::DarkGravityWave);
}

// ============================================================================
// Continuous Retargets
// ============================================================================

#[test]
fn test_dgw_short_chain_falls_back_to_ceiling() {
    let params = ConsensusParams::devnet();
    let chain = uniform_chain(10, params.genesis_time, 97, 0x1e00ffff);
    let last = chain.tip().unwrap();
    let engine = DifficultyEngine::new(&params);
    assert_eq!(
        engine.next_work_required(&chain, &last, last.time + 97),
        params.pow_limit_compact_for_height(last.height + 1)
    );
}

#[test]
fn test_dgw_fast_chain_raises_difficulty() {
    let config = ChainParamsConfig {
        allow_min_difficulty_blocks: Some(false),
        ..Default::default()
    };
    let params = ConsensusParams::from_config(Network::Devnet, &config).unwrap();
    let bits = 0x1e00ffff;
    let chain = chain_with_intervals(params.genesis_time, &[30; 40], bits);
    let last = chain.tip().unwrap();
    let engine = DifficultyEngine::new(&params);
    let next = engine.next_work_required(&chain, &last, last.time + 30);
    assert!(bits_to_target(next) < bits_to_target(bits));
}

#[test]
fn test_midas_slow_chain_lowers_difficulty() {
    let config = ChainParamsConfig {
        genesis_time: Some(1_000_000),
        ..Default::default()
    };
    let params = ConsensusParams::from_config(Network::Mainnet, &config).unwrap();
    let bits = 0x1c0fffff;
    let chain = chain_with_intervals(1_000_000, &[400; 30], bits);
    let last = chain.tip().unwrap();
    let engine = DifficultyEngine::new(&params);
    assert_eq!(engine.algorithm_for(last.height), RetargetAlgorithm::Midas);
    let next = engine.next_work_required(&chain, &last, last.time + 400);
    assert!(bits_to_target(next) > bits_to_target(bits));
    assert!(bits_to_target(next) <= bits_to_target(bits) * BigUint::from(2u32));
}
