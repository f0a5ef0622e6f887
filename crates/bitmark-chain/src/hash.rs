//! 256-bit hash type and double-SHA-256.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// A 256-bit hash.
///
/// Bytes are stored in little-endian order and compared as a 256-bit
/// little-endian integer, so `a <= b` matches the hash-vs-target comparison
/// used by proof-of-work checks. `Display` renders the conventional
/// reversed (big-endian) hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Create from raw little-endian bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    /// Raw little-endian bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check whether every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Increment as a 256-bit little-endian integer, wrapping on overflow.
    pub fn increment(&mut self) {
        for byte in self.0.iter_mut() {
            let (v, carry) = byte.overflowing_add(1);
            *byte = v;
            if !carry {
                break;
            }
        }
    }

    /// Parse from big-endian (display order) hex.
    pub fn from_hex(s: &str) -> Option<Self> {
        let raw = hex::decode(s).ok()?;
        if raw.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, b) in raw.iter().rev().enumerate() {
            bytes[i] = *b;
        }
        Some(Hash256(bytes))
    }
}

impl Ord for Hash256 {
    fn cmp(&self, other: &Self) -> Ordering {
        // Most significant byte last in storage order.
        for i in (0..32).rev() {
            match self.0[i].cmp(&other.0[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Hash256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        write!(f, "{}", hex::encode(reversed))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

/// Double SHA-256 over `data`, returned as a little-endian [`Hash256`].
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&second);
    Hash256(bytes)
}
