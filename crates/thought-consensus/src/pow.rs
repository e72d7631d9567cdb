//! Proof-of-work validation for classical and Cuckoo Cycle headers.
//!
//! The header's version bit picks the primitive. A classical header must hash
//! below its target; a cuckoo header must carry a valid 42-cycle of its own
//! graph whose proof digest is below the target. Each primitive has its own
//! ceiling.

use crate::chain_params::ConsensusParams;
use crate::cuckoo::verify_header;
use crate::error::{PowError, PowResult};
use crate::header::{proof_to_bytes, sha256d, BlockHeader};
use crate::target::{decode_compact, hash_to_target, CompactTarget};
use num_bigint::BigUint;
use tracing::{debug, trace};

/// Double SHA-256 of the serialized proof (168 little-endian bytes), read as
/// a little-endian 256-bit integer.
pub fn cuckoo_proof_hash(header: &BlockHeader) -> BigUint {
    hash_to_target(&sha256d(&proof_to_bytes(&header.cuckoo_proof)))
}

/// Check a header's proof of work against `bits`.
///
/// `header_hash` is the block hash in internal (little-endian) byte order.
/// The ceiling is chosen by the primitive the header claims; use
/// [`check_pow_at_height`] when the block height is known.
pub fn check_pow(
    header: &BlockHeader,
    header_hash: &[u8; 32],
    bits: u32,
    params: &ConsensusParams,
) -> PowResult<()> {
    let cuckoo = header.is_cuckoo_pow();
    let target = decode_target(bits)?;
    trace!(bits = %CompactTarget(bits), cuckoo, "Checking proof of work");
    check_decoded(
        header,
        header_hash,
        &target,
        params.pow_limit_for_primitive(cuckoo),
        params,
    )
}

/// Check a header's proof of work at a known height.
///
/// On top of [`check_pow`], rejects a primitive the height does not permit.
/// The ceiling is the primitive's own, tightened to the one in force for the
/// height, so a classical header never gets the cuckoo ceiling.
pub fn check_pow_at_height(
    header: &BlockHeader,
    header_hash: &[u8; 32],
    bits: u32,
    height: u32,
    params: &ConsensusParams,
) -> PowResult<()> {
    let cuckoo = header.is_cuckoo_pow();
    let allowed = if cuckoo {
        params.is_cuckoo_fork_active(height)
    } else {
        !params.is_cuckoo_required(height)
    };
    if !allowed {
        debug!(height, cuckoo, "Proof-of-work primitive not allowed at height");
        return Err(PowError::PrimitiveNotAllowed { height, cuckoo });
    }

    let target = decode_target(bits)?;
    let ceiling = params
        .pow_limit_for_primitive(cuckoo)
        .min(params.pow_limit_for_height(height));
    check_decoded(header, header_hash, &target, ceiling, params)
}

fn decode_target(bits: u32) -> PowResult<BigUint> {
    decode_compact(bits)
        .into_valid()
        .ok_or(PowError::InvalidTargetEncoding { bits })
}

fn check_decoded(
    header: &BlockHeader,
    header_hash: &[u8; 32],
    target: &BigUint,
    ceiling: &BigUint,
    params: &ConsensusParams,
) -> PowResult<()> {
    if header.is_cuckoo_pow() {
        if target > ceiling {
            return Err(above_ceiling(target, ceiling));
        }

        verify_header(header, params.cuckoo_graph_size()).map_err(PowError::CycleInvalid)?;

        let proof_hash = cuckoo_proof_hash(header);
        trace!(proof_hash = %hex_target(&proof_hash), "Cuckoo proof hash");
        if &proof_hash > target {
            debug!("Cuckoo proof hash over target");
            return Err(PowError::ProofHashExceedsTarget {
                hash: hex_target(&proof_hash),
                target: hex_target(target),
            });
        }
    } else {
        let hash = hash_to_target(header_hash);
        if &hash > target {
            return Err(PowError::HashExceedsTarget {
                hash: hex_target(&hash),
                target: hex_target(target),
            });
        }
        if target > ceiling {
            return Err(above_ceiling(target, ceiling));
        }
    }
    Ok(())
}

fn above_ceiling(target: &BigUint, ceiling: &BigUint) -> PowError {
    PowError::TargetAboveCeiling {
        target: hex_target(target),
        ceiling: hex_target(ceiling),
    }
}

/// 64-digit big-endian hex, as block explorers print targets.
fn hex_target(value: &BigUint) -> String {
    format!("{:064x}", value)
}
