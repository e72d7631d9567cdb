//! Cuckoo Cycle graph construction and proof verification.
//!
//! The graph is bipartite with `nedges = 2^(graph_size-1)` nodes per side.
//! Edge `n` connects `sip_node(keys, n, 0)` (even, U side) with
//! `sip_node(keys, n, 1)` (odd, V side). A proof is a set of 42 edges forming
//! a single simple cycle.
//!
//! Keys are derived by hashing the 80-byte header prefix with SHA-256, so the
//! proof itself never influences the graph it lives in.

mod siphash;
mod verify;

pub use siphash::{sip_node, siphash24, SipKeys};
pub use verify::{verify, verify_header};

use crate::header::BlockHeader;
use sha2::{Digest, Sha256};

/// Largest supported graph size; node ids must fit in a `u32`.
pub const MAX_GRAPH_SIZE: u32 = 31;

/// Constants derived from a graph size. Fixed for the lifetime of a solve or
/// verify call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphParams {
    /// log2 of the node count.
    pub graph_size: u32,
    /// Total node count over both sides.
    pub nnodes: u32,
    /// Nodes per side.
    pub nedges: u32,
    /// Mask applied to hash output to pick a node on one side.
    pub edgemask: u32,
    /// Size of the edge-index search space.
    pub easiness: u32,
}

impl GraphParams {
    /// Derive graph constants.
    ///
    /// `graph_size` must be in `1..=MAX_GRAPH_SIZE`; configuration loading
    /// enforces this before any graph is built.
    pub fn new(graph_size: u32) -> Self {
        assert!(
            (1..=MAX_GRAPH_SIZE).contains(&graph_size),
            "graph size {graph_size} outside 1..={MAX_GRAPH_SIZE}"
        );
        let nedges = 1u32 << (graph_size - 1);
        let nnodes = 1u32 << graph_size;
        Self {
            graph_size,
            nnodes,
            nedges,
            edgemask: nedges - 1,
            easiness: nnodes,
        }
    }

    /// U and V endpoints of an edge.
    #[inline]
    pub fn edge(&self, keys: &SipKeys, nonce: u32) -> (u32, u32) {
        (
            sip_node(keys, nonce, 0, self.edgemask),
            sip_node(keys, nonce, 1, self.edgemask),
        )
    }
}

/// SHA-256 of the 80-byte header prefix.
pub fn hash_header(header: &BlockHeader) -> [u8; 32] {
    Sha256::digest(header.serialize_base()).into()
}

/// Derive the graph keys for a header.
pub fn derive_key(header: &BlockHeader) -> SipKeys {
    SipKeys::from_bytes(&hash_header(header))
}
