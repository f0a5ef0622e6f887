//! Blocks, headers, and the algorithm/SSF version packing.

use crate::hash::{sha256d, Hash256};
use crate::pow::Algo;
use crate::ser::{compact_size_len, write_compact_size};
use crate::transaction::Transaction;

/// Base block version produced by this node.
pub const BLOCK_VERSION_DEFAULT: i32 = 4;

/// Bit position of the mining-algorithm tag inside the version word.
const VERSION_ALGO_SHIFT: i32 = 9;
/// Mask for the algorithm tag (4 bits).
const VERSION_ALGO_MASK: i32 = 0xf << VERSION_ALGO_SHIFT;
/// Slow-start update flag carried by fork-active blocks.
pub const VERSION_UPDATE_SSF: i32 = 1 << 13;

/// Algorithm tag packed into a version word.
pub fn version_algo(version: i32) -> Algo {
    Algo::from_tag(((version & VERSION_ALGO_MASK) >> VERSION_ALGO_SHIFT) as u32)
        .unwrap_or(Algo::Scrypt)
}

/// Whether a version word carries the slow-start update flag.
pub fn version_update_ssf(version: i32) -> bool {
    version & VERSION_UPDATE_SSF != 0
}

/// A block header.
///
/// Classical algorithms use the 32-bit `nonce`; Equihash blocks carry the
/// 256-bit `nonce256` and a variable-length `solution` in its place.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockHeader {
    /// Version word: base version plus packed algorithm tag and SSF flag.
    pub version: i32,
    /// Hash of the previous block.
    pub hash_prev_block: Hash256,
    /// Merkle root of the transaction list.
    pub hash_merkle_root: Hash256,
    /// Timestamp.
    pub time: u32,
    /// Compact difficulty target.
    pub bits: u32,
    /// 32-bit nonce (classical algorithms).
    pub nonce: u32,
    /// 256-bit nonce (Equihash).
    pub nonce256: Hash256,
    /// Equihash solution blob.
    pub solution: Vec<u8>,
}

impl Default for BlockHeader {
    fn default() -> Self {
        BlockHeader {
            version: BLOCK_VERSION_DEFAULT,
            hash_prev_block: Hash256::ZERO,
            hash_merkle_root: Hash256::ZERO,
            time: 0,
            bits: 0,
            nonce: 0,
            nonce256: Hash256::ZERO,
            solution: Vec::new(),
        }
    }
}

impl BlockHeader {
    /// Base version with the packed fields stripped.
    pub fn base_version(&self) -> i32 {
        self.version & 0xff
    }

    /// Algorithm tag packed into the version word.
    pub fn algo(&self) -> Algo {
        version_algo(self.version)
    }

    /// Pack an algorithm tag into the version word.
    pub fn set_algo(&mut self, algo: Algo) {
        self.version =
            (self.version & !VERSION_ALGO_MASK) | ((algo.tag() as i32) << VERSION_ALGO_SHIFT);
    }

    /// Whether the slow-start update flag is set.
    pub fn update_ssf(&self) -> bool {
        version_update_ssf(self.version)
    }

    /// Set the slow-start update flag.
    pub fn set_update_ssf(&mut self) {
        self.version |= VERSION_UPDATE_SSF;
    }

    /// The classical 80-byte header image.
    pub fn serialize_classical(&self) -> [u8; 80] {
        let mut out = [0u8; 80];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.hash_prev_block.as_bytes());
        out[36..68].copy_from_slice(self.hash_merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.time.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Canonical header serialization for this header's algorithm shape.
    pub fn serialize(&self) -> Vec<u8> {
        if self.algo() != Algo::Equihash {
            return self.serialize_classical().to_vec();
        }
        let mut out = Vec::with_capacity(76 + 32 + compact_size_len(self.solution.len() as u64)
            + self.solution.len());
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.hash_prev_block.as_bytes());
        out.extend_from_slice(self.hash_merkle_root.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(self.nonce256.as_bytes());
        write_compact_size(&mut out, self.solution.len() as u64);
        out.extend_from_slice(&self.solution);
        out
    }

    /// Header image absorbed by the Equihash state: everything up to but
    /// excluding the 256-bit nonce and the solution.
    pub fn equihash_input(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(76);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.hash_prev_block.as_bytes());
        out.extend_from_slice(self.hash_merkle_root.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out
    }

    /// Block hash: double SHA-256 of the canonical serialization.
    pub fn hash(&self) -> Hash256 {
        sha256d(&self.serialize())
    }
}

/// A block: header plus transaction list.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Block {
    /// Header.
    pub header: BlockHeader,
    /// Transactions; the first must be the coinbase.
    pub vtx: Vec<Transaction>,
}

impl Block {
    /// Compute the merkle root of the transaction list.
    pub fn merkle_root(&self) -> Hash256 {
        let txids: Vec<Hash256> = self.vtx.iter().map(|tx| tx.txid()).collect();
        merkle_root(&txids)
    }

    /// Serialize to the canonical block wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header.serialize();
        write_compact_size(&mut out, self.vtx.len() as u64);
        for tx in &self.vtx {
            tx.serialize(&mut out);
        }
        out
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        self.header.serialize().len()
            + compact_size_len(self.vtx.len() as u64)
            + self.vtx.iter().map(|tx| tx.serialized_size()).sum::<usize>()
    }

    /// Block hash.
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }
}

/// Merkle root over a list of transaction ids.
///
/// Odd levels duplicate their last entry, per the legacy tree shape.
pub fn merkle_root(hashes: &[Hash256]) -> Hash256 {
    if hashes.is_empty() {
        return Hash256::ZERO;
    }
    let mut level: Vec<Hash256> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = *pair.last().unwrap();
            let mut data = [0u8; 64];
            data[..32].copy_from_slice(left.as_bytes());
            data[32..].copy_from_slice(right.as_bytes());
            next.push(sha256d(&data));
        }
        level = next;
    }
    level[0]
}
