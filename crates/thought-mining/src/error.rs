//! Mining error types.

use thiserror::Error;
use thought_consensus::PowError;

/// Internal faults of the cycle solver.
///
/// These never occur for a correctly sized graph. A miner that hits one
/// should stop and report it rather than skip the header.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverError {
    /// A path in the cuckoo forest outgrew the path buffer without closing.
    #[error("maximum path length exceeded")]
    PathTooLong,

    /// A path in the cuckoo forest revisited one of its own nodes.
    #[error("illegal {length}-cycle")]
    IllegalCycle { length: usize },

    /// Replaying the edge space did not recover every edge of a found cycle.
    #[error("cycle recovery found only {found} edges")]
    IncompleteCycle { found: usize },
}

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Mining errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    /// Solver fault.
    #[error("Solver fault: {0}")]
    Solver(#[from] SolverError),

    /// A found proof failed validation.
    #[error("Proof of work rejected: {0}")]
    Pow(#[from] PowError),

    /// The header nonce budget ran out without a valid proof.
    #[error("No solution after {attempts} header nonces")]
    NoSolution { attempts: u64 },

    /// Mining was stopped.
    #[error("Mining cancelled")]
    Cancelled,

    /// Worker pool failure.
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

/// Result type for mining operations.
pub type MiningResult<T> = Result<T, MiningError>;
