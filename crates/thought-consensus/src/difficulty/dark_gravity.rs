//! Dark Gravity Wave v3.
//!
//! Averages the targets of the last 24 blocks and rescales the average by how
//! long those blocks took against the schedule-steering interval.

use super::{
    clamp_to_ceiling, required_previous, schedule_interval, AncestorChain, BlockSummary,
};
use crate::chain_params::ConsensusParams;
use crate::params::DGW_PAST_BLOCKS;
use crate::target::{bits_to_target, div_u64, encode_compact, mul_u64, truncate_256, CompactTarget};
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;

/// Candidate blocks this late may be mined at the ceiling.
const MIN_DIFFICULTY_GAP_SECS: i64 = 2 * 60 * 60;

/// Required bits for the block after `last`.
///
/// # Panics
/// If `chain` is missing one of the 24 blocks ending at `last`.
pub fn next_work_required<C: AncestorChain + ?Sized>(
    chain: &C,
    last: &BlockSummary,
    candidate_time: i64,
    params: &ConsensusParams,
) -> u32 {
    let next_height = last.height + 1;
    let ceiling = params.pow_limit_for_height(next_height);

    if last.height < DGW_PAST_BLOCKS {
        return encode_compact(ceiling);
    }

    if params.allow_min_difficulty_blocks {
        if candidate_time > last.time + MIN_DIFFICULTY_GAP_SECS {
            debug!(height = next_height, "DGW min difficulty, last block over 2h old");
            return encode_compact(ceiling);
        }
        if candidate_time > last.time + params.pow_target_spacing * 4 {
            debug!(height = next_height, "DGW min difficulty, last block over 4 spacings old");
            let eased = mul_u64(&bits_to_target(last.bits), 10);
            return encode_compact(&clamp_to_ceiling(eased, ceiling));
        }
    }

    let past_blocks = u64::from(DGW_PAST_BLOCKS);
    let mut oldest = *last;
    let mut average = BigUint::zero();
    for count in 1..=DGW_PAST_BLOCKS {
        average = truncate_256(average + div_u64(&bits_to_target(oldest.bits), past_blocks));
        if count != DGW_PAST_BLOCKS {
            oldest = required_previous(chain, &oldest);
        }
    }

    let desired = schedule_interval(params, last);
    let target_timespan = i64::from(DGW_PAST_BLOCKS) * desired;
    // Spans 23 intervals; kept as the consensus rule.
    let mut actual_timespan = last.time - oldest.time;
    if actual_timespan < target_timespan / 3 {
        actual_timespan = target_timespan / 3;
    }
    if actual_timespan > target_timespan * 3 {
        actual_timespan = target_timespan * 3;
    }

    let new_target = clamp_to_ceiling(
        mul_u64(
            &div_u64(&average, target_timespan.max(0) as u64),
            actual_timespan.max(0) as u64,
        ),
        ceiling,
    );
    let bits = encode_compact(&new_target);

    debug!(
        height = next_height,
        desired,
        actual_timespan,
        target_timespan,
        average = %CompactTarget(encode_compact(&average)),
        after = %CompactTarget(bits),
        "DGW retarget"
    );

    bits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_params::{ChainParamsConfig, Network};
    use crate::difficulty::HeaderChain;

    const BITS: u32 = 0x1c0fffff;

    /// Testnet timing with DGW from the first block, min-difficulty optional.
    fn dgw_params(allow_min: bool) -> ConsensusParams {
        let config = ChainParamsConfig {
            dgw_height: Some(1),
            genesis_time: Some(1_000_000),
            allow_min_difficulty_blocks: Some(allow_min),
            ..Default::default()
        };
        ConsensusParams::from_config(Network::Testnet, &config).unwrap()
    }

    fn uniform_chain(blocks: u32, spacing: i64, bits: u32) -> HeaderChain {
        let mut chain = HeaderChain::new();
        for i in 0..blocks {
            chain.push(1_000_000 + i64::from(i) * spacing, bits);
        }
        chain
    }

    fn expected(bits: u32, desired: i64, actual: i64) -> u32 {
        let target = bits_to_target(bits);
        let average = &target / BigUint::from(24u32) * BigUint::from(24u32);
        let timespan = 24 * desired;
        encode_compact(&(average / BigUint::from(timespan as u64) * BigUint::from(actual as u64)))
    }

    #[test]
    fn test_short_chain_returns_ceiling() {
        let params = dgw_params(false);
        let chain = uniform_chain(24, 97, BITS);
        let last = chain.tip().unwrap();
        assert_eq!(last.height, 23);
        assert_eq!(
            next_work_required(&chain, &last, last.time + 97, &params),
            params.pow_limit_compact_for_height(24)
        );
    }

    #[test]
    fn test_on_schedule_chain() {
        let params = dgw_params(false);
        let chain = uniform_chain(40, 97, BITS);
        let last = chain.tip().unwrap();
        // On schedule the desired interval is the fast one.
        let bits = next_work_required(&chain, &last, last.time + 97, &params);
        assert_eq!(bits, expected(BITS, 87, 23 * 97));
    }

    #[test]
    fn test_actual_timespan_clamped() {
        let params = dgw_params(false);
        let fast = uniform_chain(40, 1, BITS);
        let last = fast.tip().unwrap();
        let desired = schedule_interval(&params, &last);
        assert_eq!(
            next_work_required(&fast, &last, last.time + 1, &params),
            expected(BITS, desired, 24 * desired / 3)
        );

        let slow = uniform_chain(40, 2_000, BITS);
        let last = slow.tip().unwrap();
        let desired = schedule_interval(&params, &last);
        assert_eq!(
            next_work_required(&slow, &last, last.time + 1, &params),
            expected(BITS, desired, 24 * desired * 3)
        );
    }

    #[test]
    fn test_min_difficulty_short_circuits() {
        let params = dgw_params(true);
        let chain = uniform_chain(40, 97, BITS);
        let last = chain.tip().unwrap();
        let ceiling = params.pow_limit_for_height(last.height + 1);

        assert_eq!(
            next_work_required(&chain, &last, last.time + 7_201, &params),
            encode_compact(ceiling)
        );
        assert_eq!(
            next_work_required(&chain, &last, last.time + 4 * 97 + 1, &params),
            encode_compact(&(bits_to_target(BITS) * BigUint::from(10u32)))
        );
        assert_eq!(
            next_work_required(&chain, &last, last.time + 97, &params),
            expected(BITS, 87, 23 * 97)
        );
    }

    #[test]
    fn test_ten_times_capped_at_ceiling() {
        let params = dgw_params(true);
        let ceiling_bits = params.pow_limit_compact_for_height(40);
        let chain = uniform_chain(40, 97, ceiling_bits);
        let last = chain.tip().unwrap();
        assert_eq!(
            next_work_required(&chain, &last, last.time + 4 * 97 + 1, &params),
            encode_compact(params.pow_limit_for_height(40))
        );
    }

    #[test]
    #[should_panic(expected = "no predecessor")]
    fn test_missing_window_panics() {
        let params = dgw_params(false);
        let mut chain = HeaderChain::starting_at(100);
        for i in 0..10 {
            chain.push(1_000_000 + i * 97, BITS);
        }
        let last = chain.tip().unwrap();
        next_work_required(&chain, &last, last.time + 97, &params);
    }
}
