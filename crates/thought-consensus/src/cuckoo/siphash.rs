//! SipHash-2-4 keyed directly by the four header-derived words.
//!
//! This is the Cuckoo Cycle variant: the 256-bit key seeds all four state
//! words (no SipHash initialisation constants) and the input is a single
//! 64-bit word.

/// Keys derived from a block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SipKeys {
    pub k0: u64,
    pub k1: u64,
    pub k2: u64,
    pub k3: u64,
}

impl SipKeys {
    /// Read four little-endian words from a 32-byte digest.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            u64::from_le_bytes(buf)
        };
        Self {
            k0: word(0),
            k1: word(1),
            k2: word(2),
            k3: word(3),
        }
    }
}

/// SipHash-2-4 of a single 64-bit word.
pub fn siphash24(keys: &SipKeys, nonce: u64) -> u64 {
    let mut v0 = keys.k0;
    let mut v1 = keys.k1;
    let mut v2 = keys.k2;
    let mut v3 = keys.k3 ^ nonce;

    for _ in 0..2 {
        sipround(&mut v0, &mut v1, &mut v2, &mut v3);
    }

    v0 ^= nonce;
    v2 ^= 0xff;

    for _ in 0..4 {
        sipround(&mut v0, &mut v1, &mut v2, &mut v3);
    }

    (v0 ^ v1) ^ (v2 ^ v3)
}

/// Endpoint of edge `nonce` on side `uorv` (0 = U, 1 = V).
///
/// U nodes are even and V nodes are odd, so the two sides never collide.
#[inline]
pub fn sip_node(keys: &SipKeys, nonce: u32, uorv: u32, edgemask: u32) -> u32 {
    // The hash input is a wrapping 32-bit word.
    let input = nonce.wrapping_mul(2).wrapping_add(uorv);
    let masked = (siphash24(keys, u64::from(input)) & u64::from(edgemask)) as u32;
    (masked << 1) | uorv
}

#[inline]
fn sipround(v0: &mut u64, v1: &mut u64, v2: &mut u64, v3: &mut u64) {
    *v0 = v0.wrapping_add(*v1);
    *v2 = v2.wrapping_add(*v3);
    *v1 = v1.rotate_left(13);
    *v3 = v3.rotate_left(16);
    *v1 ^= *v0;
    *v3 ^= *v2;
    *v0 = v0.rotate_left(32);
    *v2 = v2.wrapping_add(*v1);
    *v0 = v0.wrapping_add(*v3);
    *v1 = v1.rotate_left(17);
    *v3 = v3.rotate_left(21);
    *v1 ^= *v2;
    *v3 ^= *v0;
    *v2 = v2.rotate_left(32);
}
