//! MIDAS: Multi-Interval Difficulty Adjustment System.
//!
//! Retargets every block from the average intervals of the last 5, 7, 9 and
//! 17 blocks, steering towards the interval that brings the chain back to its
//! nominal schedule. The window lengths share no common divisor, which
//! removes the harmonics timewarp attacks rely on.

use super::{clamp_to_ceiling, schedule_interval, AncestorChain, BlockSummary};
use crate::chain_params::ConsensusParams;
use crate::params::CUCKOO_FORK_RESET_BLOCKS;
use crate::target::{bits_to_target, div_u64, encode_compact, mul_u64, CompactTarget};
use tracing::debug;

/// Fixed-point scale of the difficulty factor.
const FACTOR_ONE: i64 = 10_000;

/// Average block intervals over the most recent windows, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentIntervals {
    pub avg5: i64,
    pub avg7: i64,
    pub avg9: i64,
    pub avg17: i64,
}

impl RecentIntervals {
    /// Walk 17 blocks back from `last`.
    ///
    /// The first missing predecessor reads as time 0; past it each step
    /// subtracts one nominal spacing.
    pub fn collect<C: AncestorChain + ?Sized>(
        chain: &C,
        last: &BlockSummary,
        spacing: i64,
    ) -> Self {
        let mut sums = [0i64; 4];
        let mut cursor = Some(*last);
        let mut block_time = last.time;

        for offset in 0..17 {
            let newer_time = block_time;
            match cursor {
                Some(block) => {
                    cursor = chain.previous(&block);
                    block_time = cursor.map_or(0, |prev| prev.time);
                }
                None => block_time -= spacing,
            }
            let interval = newer_time - block_time;
            if offset < 5 {
                sums[0] += interval;
            }
            if offset < 7 {
                sums[1] += interval;
            }
            if offset < 9 {
                sums[2] += interval;
            }
            sums[3] += interval;
        }

        Self {
            avg5: sums[0] / 5,
            avg7: sums[1] / 7,
            avg9: sums[2] / 9,
            avg17: sums[3] / 17,
        }
    }
}

/// Difficulty factor in units of 1/10000, before clamping.
///
/// Emergency corrections apply when three short windows sit outside a
/// 2/3..3/2 band around `desired`. Otherwise a normal correction applies when
/// at least three averages, always including the 9 and 17 block windows, lie
/// on the same side of `desired`.
pub fn difficulty_factor(intervals: &RecentIntervals, desired: i64) -> i64 {
    let RecentIntervals {
        avg5,
        avg7,
        avg9,
        avg17,
    } = *intervals;
    let too_fast = desired * 2 / 3;
    let too_slow = desired * 3 / 2;

    let mut factor = FACTOR_ONE;
    if avg5 < too_fast && avg9 < too_fast && avg17 < too_fast {
        debug!("MIDAS emergency retarget, raising difficulty");
        factor = factor * 8 / 5;
    } else if avg5 > too_slow && avg7 > too_slow && avg9 > too_slow {
        debug!("MIDAS emergency retarget, lowering difficulty");
        factor = factor * 5 / 8;
    } else if ((avg5 > desired || avg7 > desired) && avg9 > desired && avg17 > desired)
        || ((avg5 < desired || avg7 < desired) && avg9 < desired && avg17 < desired)
    {
        // Regulates one sixth of the way to the point the 17-block average
        // calls for.
        factor *= 6 * desired;
        factor /= (avg17 + 5 * desired).max(1);
    }
    factor
}

/// Required bits for the block after `last`.
pub fn next_work_required<C: AncestorChain + ?Sized>(
    chain: &C,
    last: &BlockSummary,
    candidate_time: i64,
    params: &ConsensusParams,
) -> u32 {
    let next_height = last.height + 1;
    let ceiling = params.pow_limit_for_height(next_height);
    let limit = encode_compact(ceiling);
    let spacing = params.pow_target_spacing;

    // Let difficulty fall to the new primitive right after the cuckoo fork.
    let fork = params.cuckoo_hard_fork_height;
    if next_height > fork && next_height < fork.saturating_add(CUCKOO_FORK_RESET_BLOCKS) {
        return limit;
    }

    if params.allow_min_difficulty_blocks {
        if candidate_time > last.time + spacing * 2 {
            return limit;
        }
        // The walk-back period is the nominal spacing, not the retarget
        // interval.
        let mut block = *last;
        while i64::from(block.height) % spacing != 0 && block.bits == limit {
            match chain.previous(&block) {
                Some(prev) => block = prev,
                None => break,
            }
        }
        return block.bits;
    }

    let desired = schedule_interval(params, last);
    let intervals = RecentIntervals::collect(chain, last, spacing);
    let factor = difficulty_factor(&intervals, desired).clamp(FACTOR_ONE / 2, FACTOR_ONE * 2);

    let old_target = bits_to_target(last.bits);
    if factor == FACTOR_ONE {
        return encode_compact(&old_target);
    }

    let new_target = clamp_to_ceiling(
        mul_u64(&div_u64(&old_target, factor as u64), FACTOR_ONE as u64),
        ceiling,
    );
    let bits = encode_compact(&new_target);

    debug!(
        height = next_height,
        now = last.time,
        scheduled = params.genesis_time + i64::from(last.height) * spacing,
        desired,
        avg5 = intervals.avg5,
        avg7 = intervals.avg7,
        avg9 = intervals.avg9,
        avg17 = intervals.avg17,
        factor,
        before = %CompactTarget(last.bits),
        after = %CompactTarget(bits),
        "MIDAS retarget"
    );

    bits
}
