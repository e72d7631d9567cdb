//! Kimoto Gravity Well.
//!
//! Walks back over a variable number of blocks until the observed block rate
//! leaves an "event horizon" band that narrows as more blocks are included,
//! then rescales the running average target by that rate.
//!
//! No built-in network selects this algorithm: MIDAS and DGW activate below
//! `kgw_height` everywhere. It stays available for chains whose history was
//! retargeted with it.
//!
//! Unlike MIDAS and DGW, the result is clamped to the classical ceiling at
//! every height; the cuckoo fork never loosens it.

use super::{clamp_to_ceiling, AncestorChain, BlockSummary};
use crate::chain_params::ConsensusParams;
use crate::target::{bits_to_target, div_u64, encode_compact, mul_u64, CompactTarget};
use num_bigint::BigUint;
use num_traits::Zero;
use tracing::debug;

/// Width of the event horizon band after `mass` blocks.
pub fn event_horizon_deviation(mass: u64) -> f64 {
    1.0 + 0.7084 * (mass as f64 / 28.2).powf(-1.228)
}

/// Required bits for the block after `last`.
pub fn next_work_required<C: AncestorChain + ?Sized>(
    chain: &C,
    last: &BlockSummary,
    params: &ConsensusParams,
) -> u32 {
    let spacing = params.pow_target_spacing;
    let ceiling = params.pow_limit();

    let past_seconds_min = (params.pow_target_timespan as f64 * 0.025) as u64;
    let past_seconds_max = params.pow_target_timespan as u64 * 7;
    let past_blocks_min = past_seconds_min / spacing as u64;
    let past_blocks_max = past_seconds_max / spacing as u64;

    if last.height == 0 || u64::from(last.height) < past_blocks_min {
        return encode_compact(ceiling);
    }

    let mut reading = *last;
    let mut mass: u64 = 0;
    let mut average = BigUint::zero();
    let mut average_prev = BigUint::zero();
    let mut actual_seconds: i64 = 0;
    let mut target_seconds: i64 = 0;

    let mut i: u64 = 1;
    while reading.height > 0 {
        if past_blocks_max > 0 && i > past_blocks_max {
            break;
        }
        mass += 1;

        // Running mean of the targets seen so far, without going negative.
        average = bits_to_target(reading.bits);
        if i > 1 {
            average = if average >= average_prev {
                div_u64(&(&average - &average_prev), i) + &average_prev
            } else {
                &average_prev - div_u64(&(&average_prev - &average), i)
            };
        }
        average_prev = average.clone();

        actual_seconds = (last.time - reading.time).max(0);
        target_seconds = spacing * mass as i64;
        let mut rate_ratio = 1.0;
        if actual_seconds != 0 && target_seconds != 0 {
            rate_ratio = target_seconds as f64 / actual_seconds as f64;
        }

        let horizon_fast = event_horizon_deviation(mass);
        let horizon_slow = 1.0 / horizon_fast;
        if mass >= past_blocks_min && (rate_ratio <= horizon_slow || rate_ratio >= horizon_fast) {
            break;
        }

        match chain.previous(&reading) {
            Some(prev) => reading = prev,
            None => break,
        }
        i += 1;
    }

    let mut new_target = average;
    if actual_seconds != 0 && target_seconds != 0 {
        new_target = div_u64(
            &mul_u64(&new_target, actual_seconds as u64),
            target_seconds as u64,
        );
    }
    let bits = encode_compact(&clamp_to_ceiling(new_target, ceiling));

    debug!(
        height = last.height + 1,
        mass,
        actual_seconds,
        target_seconds,
        after = %CompactTarget(bits),
        "KGW retarget"
    );

    bits
}
