//! # thought-mining
//!
//! Cuckoo Cycle mining for the Thought blockchain.
//!
//! This crate provides:
//! - A single-threaded cycle solver over the header's graph
//! - The header-nonce loop that retries graphs until a proof meets the target
//! - A worker pool running one solver per thread on disjoint header nonces
//! - A `Miner` front end with statistics and start/stop control

mod error;
mod miner;
mod solver;
mod worker;

pub use error::{MiningError, MiningResult, SolverError, SolverResult};
pub use miner::{
    random_start_nonce, solve, solve_header, Miner, MinerOptions, MiningStats, SearchLimits,
};
pub use solver::CuckooSolver;
pub use worker::{FoundSolution, MiningTask, MiningWorker, WorkerPool};
