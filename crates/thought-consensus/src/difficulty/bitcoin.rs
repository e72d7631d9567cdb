//! Classical fixed-interval retargeting.
//!
//! The target changes once every `timespan / spacing` blocks, scaled by the
//! time the last window actually took. Between boundaries the previous bits
//! carry over, except on networks that allow minimum-difficulty blocks.

use super::{clamp_to_ceiling, required_ancestor, AncestorChain, BlockSummary};
use crate::chain_params::ConsensusParams;
use crate::target::{bits_to_target, div_u64, encode_compact, mul_u64, CompactTarget};
use tracing::debug;

/// Required bits for the block after `last`.
pub fn next_work_required<C: AncestorChain + ?Sized>(
    chain: &C,
    last: &BlockSummary,
    candidate_time: i64,
    params: &ConsensusParams,
) -> u32 {
    let limit = params.pow_limit_compact_for_height(last.height + 1);
    let interval = params.difficulty_adjustment_interval();

    if (i64::from(last.height) + 1) % interval != 0 {
        if params.allow_min_difficulty_blocks {
            // A block more than two spacings late may be mined at the ceiling.
            if candidate_time > last.time + params.pow_target_spacing * 2 {
                return limit;
            }
            // Otherwise use the last bits not set by that rule.
            let mut block = *last;
            while i64::from(block.height) % interval != 0 && block.bits == limit {
                match chain.previous(&block) {
                    Some(prev) => block = prev,
                    None => break,
                }
            }
            return block.bits;
        }
        return last.bits;
    }

    let first_height = i64::from(last.height) - (interval - 1);
    assert!(
        first_height >= 0,
        "retarget window starts below genesis at height {}",
        last.height
    );
    let first = required_ancestor(chain, first_height as u32);

    calculate_next_work_required(last, first.time, params)
}

/// Scale `last`'s target by the time the window took, starting at
/// `first_block_time`.
///
/// The elapsed time is clamped to `[timespan/4, timespan*4]`, so one retarget
/// moves the target by at most a factor of four either way.
pub fn calculate_next_work_required(
    last: &BlockSummary,
    first_block_time: i64,
    params: &ConsensusParams,
) -> u32 {
    if params.no_retargeting {
        return last.bits;
    }

    let timespan = params.pow_target_timespan;
    let actual = (last.time - first_block_time).clamp(timespan / 4, timespan * 4);

    let ceiling = params.pow_limit_for_height(last.height + 1);
    let scaled = mul_u64(&bits_to_target(last.bits), actual as u64);
    let new_target = clamp_to_ceiling(div_u64(&scaled, timespan as u64), ceiling);
    let bits = encode_compact(&new_target);

    debug!(
        height = last.height + 1,
        actual_timespan = actual,
        target_timespan = timespan,
        before = %CompactTarget(last.bits),
        after = %CompactTarget(bits),
        "Classical retarget"
    );

    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_params::{ChainParamsConfig, Network};
    use crate::difficulty::HeaderChain;
    use crate::target::encode_compact;
    use num_bigint::BigUint;

    /// Devnet timing with the classical rule kept in force.
    fn classical_params(allow_min: bool, no_retargeting: bool) -> ConsensusParams {
        let config = ChainParamsConfig {
            midas_start_height: Some(u32::MAX),
            dgw_height: Some(u32::MAX),
            allow_min_difficulty_blocks: Some(allow_min),
            no_retargeting: Some(no_retargeting),
            ..Default::default()
        };
        ConsensusParams::from_config(Network::Devnet, &config).unwrap()
    }

    fn chain_with_spacing(blocks: u32, spacing: i64, bits: u32) -> HeaderChain {
        let mut chain = HeaderChain::new();
        for i in 0..blocks {
            chain.push(1_000_000 + i64::from(i) * spacing, bits);
        }
        chain
    }

    // ============ Off-boundary ============

    #[test]
    fn test_off_boundary_keeps_last_bits() {
        let params = classical_params(false, false);
        let chain = chain_with_spacing(10, 97, 0x1d00ffff);
        let last = chain.tip().unwrap();
        assert_eq!(next_work_required(&chain, &last, last.time + 10_000, &params), 0x1d00ffff);
    }

    #[test]
    fn test_min_difficulty_after_long_gap() {
        let params = classical_params(true, false);
        let chain = chain_with_spacing(10, 97, 0x1d00ffff);
        let last = chain.tip().unwrap();
        let limit = params.pow_limit_compact_for_height(last.height + 1);
        assert_eq!(next_work_required(&chain, &last, last.time + 2 * 97 + 1, &params), limit);
        // Exactly two spacings is not late enough.
        assert_eq!(
            next_work_required(&chain, &last, last.time + 2 * 97, &params),
            0x1d00ffff
        );
    }

    #[test]
    fn test_min_difficulty_walks_back_over_ceiling_blocks() {
        let params = classical_params(true, false);
        let limit = params.pow_limit_compact_for_height(1);
        let mut chain = chain_with_spacing(5, 97, 0x1d00ffff);
        chain.push(1_000_485 + 500, limit);
        chain.push(1_000_485 + 600, limit);
        let last = chain.tip().unwrap();
        assert_eq!(next_work_required(&chain, &last, last.time + 10, &params), 0x1d00ffff);
    }

    // ============ Boundary ============

    #[test]
    fn test_boundary_on_schedule_keeps_target() {
        let params = classical_params(false, false);
        let interval = params.difficulty_adjustment_interval() as u32;
        // Window of `interval` blocks spans interval-1 gaps; pad the last one.
        let mut chain = chain_with_spacing(interval - 1, 97, 0x1d00ffff);
        let first_time = chain.ancestor(0).unwrap().time;
        chain.push(first_time + params.pow_target_timespan, 0x1d00ffff);
        let last = chain.tip().unwrap();
        assert_eq!(
            next_work_required(&chain, &last, last.time + 97, &params),
            0x1d00ffff
        );
    }

    #[test]
    fn test_half_timespan_halves_target() {
        let params = classical_params(false, false);
        let last = BlockSummary::new(889, 1_000_000 + 43_200, 0x1d00ffff);
        let bits = calculate_next_work_required(&last, 1_000_000, &params);
        let expected = encode_compact(&(bits_to_target(0x1d00ffff) / BigUint::from(2u32)));
        assert_eq!(bits, expected);
    }

    #[test]
    fn test_clamped_to_quarter_and_four_times() {
        let params = classical_params(false, false);
        let start = 1_000_000;
        let fast = BlockSummary::new(889, start + 1, 0x1c0fffff);
        let slow = BlockSummary::new(889, start + 10 * 86_400, 0x1c0fffff);
        let target = bits_to_target(0x1c0fffff);
        assert_eq!(
            calculate_next_work_required(&fast, start, &params),
            encode_compact(&(&target / BigUint::from(4u32)))
        );
        assert_eq!(
            calculate_next_work_required(&slow, start, &params),
            encode_compact(&(&target * BigUint::from(4u32)))
        );
    }

    #[test]
    fn test_clamped_to_ceiling() {
        let config = ChainParamsConfig {
            midas_start_height: Some(u32::MAX),
            dgw_height: Some(u32::MAX),
            ..Default::default()
        };
        let params = ConsensusParams::from_config(Network::Mainnet, &config).unwrap();
        // Already at the classical ceiling; a slow window cannot ease further.
        let last = BlockSummary::new(1_440, 1_000_000 + 4 * 139_795, 0x1d00ffff);
        let bits = calculate_next_work_required(&last, 1_000_000, &params);
        assert_eq!(bits, 0x1d00ffff);
    }

    #[test]
    fn test_no_retargeting_returns_last_bits() {
        let params = classical_params(false, true);
        let last = BlockSummary::new(889, 1_000_000 + 1, 0x1d00ffff);
        assert_eq!(calculate_next_work_required(&last, 1_000_000, &params), 0x1d00ffff);
    }

    #[test]
    #[should_panic(expected = "no block at height")]
    fn test_missing_window_start_panics() {
        let params = classical_params(false, false);
        let mut chain = HeaderChain::starting_at(800);
        for i in 0..90 {
            chain.push(1_000_000 + i * 97, 0x1d00ffff);
        }
        let last = chain.tip().unwrap();
        assert_eq!(last.height, 889);
        next_work_required(&chain, &last, last.time + 97, &params);
    }
}
