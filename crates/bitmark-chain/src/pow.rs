//! Mining algorithm tags and proof-of-work hashing.

use crate::block::BlockHeader;
use crate::compact::{compact_to_target, hash_to_biguint};
use crate::hash::{sha256d, Hash256};
use scrypt::Params as ScryptParams;

/// Shape of the nonce domain a search driver iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceShape {
    /// The classical 32-bit header nonce.
    Bits32,
    /// A 256-bit nonce plus a variable-length solution blob.
    Bits256WithSolution,
}

/// Supported mining algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algo {
    /// scrypt(1024, 1, 1).
    Scrypt,
    /// Double SHA-256.
    Sha256d,
    /// Equihash (n, k) as configured by chain params.
    Equihash,
}

impl Algo {
    /// All supported algorithms.
    pub const ALL: [Algo; 3] = [Algo::Scrypt, Algo::Sha256d, Algo::Equihash];

    /// Tag packed into the block version word.
    pub fn tag(&self) -> u32 {
        match self {
            Algo::Scrypt => 0,
            Algo::Sha256d => 1,
            Algo::Equihash => 2,
        }
    }

    /// Decode a version tag.
    pub fn from_tag(tag: u32) -> Option<Algo> {
        match tag {
            0 => Some(Algo::Scrypt),
            1 => Some(Algo::Sha256d),
            2 => Some(Algo::Equihash),
            _ => None,
        }
    }

    /// Human-readable name, as used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Algo::Scrypt => "scrypt",
            Algo::Sha256d => "sha256d",
            Algo::Equihash => "equihash",
        }
    }

    /// Parse a configuration name.
    pub fn from_name(name: &str) -> Option<Algo> {
        match name {
            "scrypt" => Some(Algo::Scrypt),
            "sha256d" => Some(Algo::Sha256d),
            "equihash" => Some(Algo::Equihash),
            _ => None,
        }
    }

    /// The nonce domain this algorithm searches.
    pub fn nonce_shape(&self) -> NonceShape {
        match self {
            Algo::Equihash => NonceShape::Bits256WithSolution,
            _ => NonceShape::Bits32,
        }
    }

    /// The algorithm actually hashed for a given header.
    ///
    /// Headers with base version <= 3 predate the multi-algorithm fork and
    /// are always Scrypt, whatever the requested algorithm says.
    pub fn effective_for(header: &BlockHeader, requested: Algo) -> Algo {
        if header.base_version() <= 3 {
            Algo::Scrypt
        } else {
            requested
        }
    }
}

/// Proof-of-work hash of a header under the given algorithm.
pub fn pow_hash(header: &BlockHeader, algo: Algo) -> Hash256 {
    match algo {
        Algo::Sha256d => sha256d(&header.serialize_classical()),
        Algo::Scrypt => scrypt_hash(&header.serialize_classical()),
        // Equihash blocks are judged by the hash of the full header,
        // solution included; solution validity is checked separately.
        Algo::Equihash => sha256d(&header.serialize()),
    }
}

/// Whether `hash` satisfies the compact target `bits`.
pub fn check_proof_of_work(hash: &Hash256, bits: u32) -> bool {
    let target = compact_to_target(bits);
    if target == 0u32.into() {
        return false;
    }
    hash_to_biguint(hash) <= target
}

/// scrypt(1024, 1, 1) with the input as its own salt.
fn scrypt_hash(data: &[u8]) -> Hash256 {
    let params = ScryptParams::new(10, 1, 1, 32).expect("static scrypt parameters");
    let mut out = [0u8; 32];
    scrypt::scrypt(data, data, &params, &mut out).expect("32-byte scrypt output");
    Hash256::from_bytes(out)
}
