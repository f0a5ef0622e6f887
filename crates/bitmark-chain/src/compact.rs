//! Compact difficulty encoding (`nBits`) and target arithmetic.

use crate::hash::Hash256;
use num_bigint::BigUint;

/// Expand compact bits into a 256-bit target.
///
/// The sign bit and overflow are treated as a zero target; mining targets
/// are always positive.
pub fn compact_to_target(bits: u32) -> BigUint {
    let size = (bits >> 24) as usize;
    let word = bits & 0x007f_ffff;
    if bits & 0x0080_0000 != 0 {
        return BigUint::from(0u32);
    }
    if size <= 3 {
        BigUint::from(word >> (8 * (3 - size)))
    } else {
        BigUint::from(word) << (8 * (size - 3))
    }
}

/// Compress a target back into compact bits.
pub fn target_to_compact(target: &BigUint) -> u32 {
    let bytes = target.to_bytes_be();
    if target == &BigUint::from(0u32) {
        return 0;
    }
    let mut size = bytes.len();
    let mut compact: u32 = if size <= 3 {
        let mut word = 0u32;
        for b in &bytes {
            word = (word << 8) | *b as u32;
        }
        word << (8 * (3 - size))
    } else {
        ((target >> (8 * (size - 3))) & BigUint::from(0x00ff_ffffu32))
            .iter_u32_digits()
            .next()
            .unwrap_or(0)
    };
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | ((size as u32) << 24)
}

/// Interpret a hash as a 256-bit little-endian integer.
pub fn hash_to_biguint(hash: &Hash256) -> BigUint {
    BigUint::from_bytes_le(hash.as_bytes())
}
