//! Compact target (`nBits`) encoding and 256-bit target arithmetic.
//!
//! Targets are carried as `BigUint` but every operation that could exceed 256
//! bits is truncated back to 256 bits, so retarget arithmetic reproduces a
//! fixed-width unsigned register bit-for-bit.
//!
//! `nBits` format: `0x[size][word]`
//! - size: 1 byte, byte length of the target
//! - word: 3 bytes, most significant bytes of the target (bit 23 is a sign bit)

use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::fmt;

/// Width of a target register in bits.
pub const TARGET_BITS: usize = 256;

/// Sign bit inside the compact mantissa.
const COMPACT_SIGN_BIT: u32 = 0x0080_0000;

/// Mantissa mask (excluding the sign bit).
const COMPACT_WORD_MASK: u32 = 0x007f_ffff;

/// A difficulty target in 32-bit compact form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompactTarget(pub u32);

impl CompactTarget {
    /// Wrap a raw consensus `nBits` value.
    pub const fn from_consensus(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw consensus value.
    pub const fn to_consensus(self) -> u32 {
        self.0
    }

    /// Decode, reporting sign and overflow flags.
    pub fn decode(self) -> DecodedTarget {
        decode_compact(self.0)
    }

    /// Encode a wide target.
    pub fn from_target(target: &BigUint) -> Self {
        Self(encode_compact(target))
    }
}

impl fmt::Display for CompactTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for CompactTarget {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

/// Result of decoding an `nBits` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTarget {
    /// Decoded magnitude, truncated to 256 bits.
    pub target: BigUint,
    /// The sign bit was set on a non-zero mantissa.
    pub negative: bool,
    /// The encoded value does not fit in 256 bits.
    pub overflow: bool,
}

impl DecodedTarget {
    /// A target usable for proof-of-work comparison: positive, non-zero and
    /// within 256 bits.
    pub fn into_valid(self) -> Option<BigUint> {
        if self.negative || self.overflow || self.target.is_zero() {
            None
        } else {
            Some(self.target)
        }
    }
}

/// `2^256 - 1`.
pub fn max_target() -> BigUint {
    (BigUint::one() << TARGET_BITS) - BigUint::one()
}

/// Truncate to the low 256 bits.
pub fn truncate_256(value: BigUint) -> BigUint {
    if value.bits() as usize <= TARGET_BITS {
        value
    } else {
        value & max_target()
    }
}

/// 256-bit wrapping multiply by a small factor.
pub fn mul_u64(target: &BigUint, factor: u64) -> BigUint {
    truncate_256(target * BigUint::from(factor))
}

/// Integer division by a small divisor. A zero divisor yields zero instead of
/// panicking; retarget callers never divide by zero on a well-formed chain.
pub fn div_u64(target: &BigUint, divisor: u64) -> BigUint {
    if divisor == 0 {
        return BigUint::zero();
    }
    target / BigUint::from(divisor)
}

/// Decode a compact `nBits` value into a wide target.
pub fn decode_compact(bits: u32) -> DecodedTarget {
    let size = (bits >> 24) as usize;
    let mut word = bits & COMPACT_WORD_MASK;

    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        BigUint::from(word)
    } else {
        truncate_256(BigUint::from(word) << (8 * (size - 3)))
    };

    let negative = word != 0 && (bits & COMPACT_SIGN_BIT) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    DecodedTarget {
        target,
        negative,
        overflow,
    }
}

/// Decode a compact value ignoring the sign/overflow flags.
///
/// Used on bits already accepted into the chain, where the flags were checked
/// when the block was connected.
pub fn bits_to_target(bits: u32) -> BigUint {
    decode_compact(bits).target
}

/// Encode a wide target into its compact `nBits` form.
pub fn encode_compact(target: &BigUint) -> u32 {
    let mut size = (target.bits() as usize + 7) / 8;
    let mut compact: u32 = if size <= 3 {
        (low_u64(target) << (8 * (3 - size))) as u32
    } else {
        low_u64(&(target >> (8 * (size - 3)))) as u32
    };

    // The mantissa's top bit is a sign bit; move a set bit into the exponent.
    if compact & COMPACT_SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | ((size as u32) << 24)
}

/// Parse a big-endian hex string (optionally `0x`-prefixed) into a target.
pub fn target_from_hex(hex_str: &str) -> Option<BigUint> {
    let cleaned = hex_str.trim();
    let cleaned = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(cleaned);
    if cleaned.is_empty() {
        return None;
    }
    BigUint::parse_bytes(cleaned.as_bytes(), 16)
}

/// Interpret a 32-byte digest stored little-endian (least significant byte
/// first) as a 256-bit integer.
pub fn hash_to_target(hash: &[u8; 32]) -> BigUint {
    BigUint::from_bytes_le(hash)
}

fn low_u64(value: &BigUint) -> u64 {
    value.iter_u64_digits().next().unwrap_or(0)
}
