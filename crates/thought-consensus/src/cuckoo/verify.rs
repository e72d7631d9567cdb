//! Stateless Cuckoo Cycle proof verification.

use super::{derive_key, GraphParams, SipKeys};
use crate::error::{CycleError, VerifyOutcome};
use crate::header::{BlockHeader, Proof};
use crate::params::PROOF_SIZE;
use tracing::trace;

/// Verify that `proof` is a single 42-cycle in the graph keyed by `keys`.
///
/// Checks run in order: edge range and strict ascension, endpoint XOR
/// cancellation, then a walk around the cycle.
pub fn verify(proof: &Proof, keys: &SipKeys, graph_size: u32) -> VerifyOutcome {
    let graph = GraphParams::new(graph_size);

    let mut uvs = [0u32; 2 * PROOF_SIZE];
    let mut xor0 = 0u32;
    let mut xor1 = 0u32;

    for (n, &nonce) in proof.iter().enumerate() {
        if nonce > graph.nnodes {
            return Err(CycleError::ProofTooBig);
        }
        if n > 0 && nonce <= proof[n - 1] {
            return Err(CycleError::ProofNotAscending);
        }
        let (u, v) = graph.edge(keys, nonce);
        uvs[2 * n] = u;
        uvs[2 * n + 1] = v;
        xor0 ^= u;
        xor1 ^= v;
    }

    // Every node of a cycle appears in exactly two edges, so each side's XOR
    // must cancel.
    if xor0 | xor1 != 0 {
        return Err(CycleError::EndpointsNonMatching);
    }

    walk_cycle(&uvs)
}

/// Walk the cycle through the endpoint slots `uvs` (`2n` = U of edge `n`,
/// `2n + 1` = V) starting from slot 0.
fn walk_cycle(uvs: &[u32; 2 * PROOF_SIZE]) -> VerifyOutcome {
    let slots = uvs.len();
    let mut length = 0usize;
    let mut i = 0usize;
    loop {
        // Find the other slot on the same side holding the node at `i`.
        let mut j = i;
        let mut k = (i + 2) % slots;
        while k != i {
            if uvs[k] == uvs[i] {
                if j != i {
                    return Err(CycleError::CycleHasBranch);
                }
                j = k;
            }
            k = (k + 2) % slots;
        }
        if j == i {
            return Err(CycleError::CycleDeadEnd);
        }
        // Cross to the other endpoint of the matched edge.
        i = j ^ 1;
        length += 1;
        if i == 0 {
            break;
        }
    }

    if length == PROOF_SIZE {
        Ok(())
    } else {
        Err(CycleError::CycleWrongLength)
    }
}

/// Verify the cuckoo proof carried by a header against its own graph.
pub fn verify_header(header: &BlockHeader, graph_size: u32) -> VerifyOutcome {
    let keys = derive_key(header);
    let outcome = verify(&header.cuckoo_proof, &keys, graph_size);
    match outcome {
        Ok(()) => trace!("Cuckoo cycle verified"),
        Err(e) => trace!(error = %e, "Cuckoo cycle not verified"),
    }
    outcome
}
