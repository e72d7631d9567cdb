//! Block header fields consumed by proof-of-work.
//!
//! Only the fixed 80-byte prefix and the optional cuckoo proof are modelled
//! here; full block (de)serialization lives with the block data model.

use crate::params::{CUCKOO_VERSION_MASK, HEADER_SIZE, PROOF_SIZE};
use sha2::{Digest, Sha256};

/// A Cuckoo Cycle proof: 42 strictly ascending edge indices.
pub type Proof = [u32; PROOF_SIZE];

/// Block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version. Bit 30 selects the Cuckoo Cycle primitive.
    pub version: i32,
    /// Previous block hash (internal byte order).
    pub prev_block: [u8; 32],
    /// Merkle root (internal byte order).
    pub merkle_root: [u8; 32],
    /// Block time (unix seconds).
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// Header nonce, incremented by miners between graph attempts.
    pub nonce: u32,
    /// Cuckoo proof. Ignored for classical headers.
    pub cuckoo_proof: Proof,
}

impl Default for BlockHeader {
    fn default() -> Self {
        Self {
            version: 1,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
            cuckoo_proof: [0u32; PROOF_SIZE],
        }
    }
}

impl BlockHeader {
    /// Whether this header claims a Cuckoo Cycle proof.
    pub fn is_cuckoo_pow(&self) -> bool {
        (self.version as u32) & CUCKOO_VERSION_MASK != 0
    }

    /// Set or clear the cuckoo version bit.
    pub fn set_cuckoo_pow(&mut self, cuckoo: bool) {
        let version = self.version as u32;
        self.version = if cuckoo {
            (version | CUCKOO_VERSION_MASK) as i32
        } else {
            (version & !CUCKOO_VERSION_MASK) as i32
        };
    }

    /// Canonical 80-byte serialization (version through nonce).
    pub fn serialize_base(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_block);
        out[36..68].copy_from_slice(&self.merkle_root);
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Full serialization: the base followed by the proof for cuckoo headers.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = self.serialize_base().to_vec();
        if self.is_cuckoo_pow() {
            out.extend_from_slice(&proof_to_bytes(&self.cuckoo_proof));
        }
        out
    }

    /// Double SHA-256 of the full serialization.
    pub fn hash(&self) -> [u8; 32] {
        sha256d(&self.serialize())
    }

    /// Block hash as printed by explorers (most significant byte first).
    pub fn hash_hex(&self) -> String {
        let mut hash = self.hash();
        hash.reverse();
        hex::encode(hash)
    }
}

/// Little-endian byte encoding of a proof.
pub fn proof_to_bytes(proof: &Proof) -> Vec<u8> {
    proof.iter().flat_map(|nonce| nonce.to_le_bytes()).collect()
}

/// SHA-256 applied twice.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}
