//! Error types for proof-of-work validation.

use thiserror::Error;

/// Reasons a Cuckoo Cycle proof is rejected by the verifier.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleError {
    /// An edge index lies outside the graph.
    #[error("edge index too big")]
    ProofTooBig,

    /// Edge indices are not strictly ascending (also catches duplicates).
    #[error("edges not ascending")]
    ProofNotAscending,

    /// XOR of all endpoints on one side is non-zero.
    #[error("endpoints do not match up")]
    EndpointsNonMatching,

    /// A node is shared by more than two proof edges.
    #[error("cycle has a branch")]
    CycleHasBranch,

    /// A node has no partner edge in the proof.
    #[error("cycle dead-ends")]
    CycleDeadEnd,

    /// The traced cycle does not cover all proof edges.
    #[error("cycle has wrong length")]
    CycleWrongLength,
}

/// Outcome of verifying a cycle proof. `Ok(())` means the proof is valid.
pub type VerifyOutcome = Result<(), CycleError>;

/// Proof-of-work validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    /// The compact target decodes to a negative, zero or overflowing value.
    #[error("Invalid target encoding: 0x{bits:08x}")]
    InvalidTargetEncoding { bits: u32 },

    /// The target is easier than the ceiling allowed for this primitive or height.
    #[error("Target {target} above ceiling {ceiling}")]
    TargetAboveCeiling { target: String, ceiling: String },

    /// Classical proof: the header hash does not meet the target.
    #[error("Header hash {hash} exceeds target {target}")]
    HashExceedsTarget { hash: String, target: String },

    /// Cuckoo proof: the cycle is not a valid 42-cycle of the header's graph.
    #[error("Invalid cuckoo cycle: {0}")]
    CycleInvalid(#[source] CycleError),

    /// Cuckoo proof: the digest of the proof does not meet the target.
    #[error("Cuckoo proof hash {hash} exceeds target {target}")]
    ProofHashExceedsTarget { hash: String, target: String },

    /// The header uses a proof-of-work primitive not permitted at its height.
    #[error("Proof-of-work primitive (cuckoo={cuckoo}) not allowed at height {height}")]
    PrimitiveNotAllowed { height: u32, cuckoo: bool },
}

/// Result type for proof-of-work validation.
pub type PowResult<T> = Result<T, PowError>;
