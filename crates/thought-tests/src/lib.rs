//! # thought-tests
//!
//! Integration tests for the Thought proof-of-work workspace.
//!
//! This crate provides:
//! - Cross-crate tests pairing the cycle solver with the validator
//! - Retarget scenario tests over generated ancestor chains
//! - Property-based tests for proof and retarget invariants

pub mod generators;


#[cfg(test)]
mod difficulty_tests;


pub use generators::*;
