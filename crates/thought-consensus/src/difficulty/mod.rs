//! Difficulty retargeting.
//!
//! The next block's compact target is a pure function of the ancestor chain
//! and the consensus parameters. The algorithm is selected by height:
//!
//! 1. below `min_difficulty_blocks`: the ceiling, no retargeting
//! 2. from `dgw_height`: Dark Gravity Wave
//! 3. from `midas_start_height`: MIDAS
//! 4. otherwise: classical fixed-interval retargeting
//!
//! Kimoto Gravity Well is kept in [`gravity_well`] but no network reaches it.

pub mod bitcoin;
pub mod dark_gravity;
pub mod gravity_well;
pub mod midas;

use crate::chain_params::ConsensusParams;
use crate::header::BlockHeader;
use crate::target::CompactTarget;
use num_bigint::BigUint;
use std::fmt;
use tracing::debug;

/// Fields of an ancestor block consumed by retargeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSummary {
    /// Block height.
    pub height: u32,
    /// Block time in unix seconds.
    pub time: i64,
    /// Compact target the block was mined at.
    pub bits: u32,
}

impl BlockSummary {
    pub fn new(height: u32, time: i64, bits: u32) -> Self {
        Self { height, time, bits }
    }
}

/// Read-only view of the chain behind the block being retargeted.
pub trait AncestorChain {
    /// Block at `height` on this chain, if known.
    fn ancestor(&self, height: u32) -> Option<BlockSummary>;

    /// Predecessor of `block`.
    fn previous(&self, block: &BlockSummary) -> Option<BlockSummary> {
        block.height.checked_sub(1).and_then(|h| self.ancestor(h))
    }
}

/// In-memory chain of block summaries with contiguous heights.
///
/// The chain may start above genesis; blocks below `base_height` read as
/// missing, as if the first stored block had no predecessor.
#[derive(Debug, Clone, Default)]
pub struct HeaderChain {
    base_height: u32,
    blocks: Vec<BlockSummary>,
}

impl HeaderChain {
    /// Empty chain starting at genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty chain whose first block will have height `base_height`.
    pub fn starting_at(base_height: u32) -> Self {
        Self {
            base_height,
            blocks: Vec::new(),
        }
    }

    /// Append a block and return its summary.
    pub fn push(&mut self, time: i64, bits: u32) -> BlockSummary {
        let block = BlockSummary::new(self.base_height + self.blocks.len() as u32, time, bits);
        self.blocks.push(block);
        block
    }

    /// Most recent block.
    pub fn tip(&self) -> Option<BlockSummary> {
        self.blocks.last().copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl AncestorChain for HeaderChain {
    fn ancestor(&self, height: u32) -> Option<BlockSummary> {
        let index = height.checked_sub(self.base_height)?;
        self.blocks.get(index as usize).copied()
    }
}

/// Retarget algorithm in force for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetargetAlgorithm {
    /// Leading dev-network blocks mined at the ceiling.
    MinimumDifficulty,
    DarkGravityWave,
    Midas,
    /// Classical fixed-interval retarget.
    Bitcoin,
}

impl fmt::Display for RetargetAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetargetAlgorithm::MinimumDifficulty => "min-difficulty",
            RetargetAlgorithm::DarkGravityWave => "dgw",
            RetargetAlgorithm::Midas => "midas",
            RetargetAlgorithm::Bitcoin => "btc",
        };
        f.write_str(name)
    }
}

/// Computes the required target of the next block.
pub struct DifficultyEngine<'a> {
    params: &'a ConsensusParams,
}

impl<'a> DifficultyEngine<'a> {
    /// Create an engine over the given consensus parameters.
    pub fn new(params: &'a ConsensusParams) -> Self {
        Self { params }
    }

    /// Algorithm that retargets the block after `last_height`.
    pub fn algorithm_for(&self, last_height: u32) -> RetargetAlgorithm {
        let next_height = last_height + 1;
        if last_height < self.params.min_difficulty_blocks {
            RetargetAlgorithm::MinimumDifficulty
        } else if next_height >= self.params.dgw_height {
            RetargetAlgorithm::DarkGravityWave
        } else if next_height >= self.params.midas_start_height {
            RetargetAlgorithm::Midas
        } else {
            RetargetAlgorithm::Bitcoin
        }
    }

    /// Compact target required of a block following `last` with timestamp
    /// `candidate_time`.
    ///
    /// # Panics
    /// If `chain` lacks an ancestor the selected algorithm must read, which
    /// means the chain index is corrupt.
    pub fn next_work_required<C: AncestorChain + ?Sized>(
        &self,
        chain: &C,
        last: &BlockSummary,
        candidate_time: i64,
    ) -> u32 {
        let algorithm = self.algorithm_for(last.height);
        let bits = match algorithm {
            RetargetAlgorithm::MinimumDifficulty => {
                self.params.pow_limit_compact_for_height(last.height + 1)
            }
            RetargetAlgorithm::DarkGravityWave => {
                dark_gravity::next_work_required(chain, last, candidate_time, self.params)
            }
            RetargetAlgorithm::Midas => {
                midas::next_work_required(chain, last, candidate_time, self.params)
            }
            RetargetAlgorithm::Bitcoin => {
                bitcoin::next_work_required(chain, last, candidate_time, self.params)
            }
        };
        debug!(
            height = last.height + 1,
            %algorithm,
            bits = %CompactTarget(bits),
            "Next work required"
        );
        bits
    }

    /// Required target of `candidate`, the block following `last`.
    pub fn next_target<C: AncestorChain + ?Sized>(
        &self,
        chain: &C,
        last: &BlockSummary,
        candidate: &BlockHeader,
    ) -> CompactTarget {
        CompactTarget(self.next_work_required(chain, last, i64::from(candidate.time)))
    }
}

/// Ancestor the retarget window requires.
fn required_ancestor<C: AncestorChain + ?Sized>(chain: &C, height: u32) -> BlockSummary {
    chain
        .ancestor(height)
        .unwrap_or_else(|| panic!("ancestor chain has no block at height {}", height))
}

/// Predecessor the retarget window requires.
fn required_previous<C: AncestorChain + ?Sized>(chain: &C, block: &BlockSummary) -> BlockSummary {
    chain
        .previous(block)
        .unwrap_or_else(|| panic!("ancestor chain has no predecessor of height {}", block.height))
}

/// Cap a target at the ceiling.
fn clamp_to_ceiling(target: BigUint, ceiling: &BigUint) -> BigUint {
    if &target > ceiling {
        ceiling.clone()
    } else {
        target
    }
}

/// Block interval that steers the chain back to its nominal schedule.
///
/// The schedule places block `h` at `genesis_time + h * spacing`. Within one
/// adjustment window of the schedule the interval is interpolated towards the
/// fast interval when blocks lag the schedule and towards the slow interval
/// when they run ahead of it. Beyond the window the extreme is used.
fn schedule_interval(params: &ConsensusParams, last: &BlockSummary) -> i64 {
    let spacing = params.pow_target_spacing;
    let window = params.difficulty_adjustment_interval();
    let fast = spacing * 9 / 10;
    let slow = spacing * 11 / 10;

    let now = last.time;
    let scheduled = params.genesis_time + i64::from(last.height) * spacing;

    if now < scheduled + window && now > scheduled {
        ((window - (now - scheduled)) * spacing + (now - scheduled) * fast) / window
    } else if now + window > scheduled && now < scheduled {
        ((window - (scheduled - now)) * spacing + (scheduled - now) * slow) / window
    } else if now < scheduled {
        slow
    } else {
        fast
    }
}
