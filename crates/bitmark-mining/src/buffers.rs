//! Pre-built hash buffers for the classical double-SHA-256 pipeline.
//!
//! External hashing engines take three buffers: the SHA-256 midstate after
//! the header's first 64-byte block, the padded and word-reversed header
//! image with in-place slots for time/bits/nonce, and the pre-padded
//! buffer for the second hash. Layout and padding follow the SHA-256
//! convention: `0x80` terminator, zero fill, message bit length in the
//! final word, every 32-bit word byte-reversed for the engine's
//! endianness.

use bitmark_chain::BlockHeader;
use sha2::compress256;
use sha2::digest::generic_array::GenericArray;

/// SHA-256 initial state words.
const SHA256_INIT: [u32; 8] = [
    0x6a09_e667,
    0xbb67_ae85,
    0x3c6e_f372,
    0xa54f_f53a,
    0x510e_527f,
    0x9b05_688c,
    0x1f83_d9ab,
    0x5be0_cd19,
];

/// Byte offset of the header timestamp inside `data`.
pub const DATA_TIME_OFFSET: usize = 64 + 4;
/// Byte offset of the compact bits inside `data`.
pub const DATA_BITS_OFFSET: usize = 64 + 8;
/// Byte offset of the 32-bit nonce inside `data`.
pub const DATA_NONCE_OFFSET: usize = 64 + 12;

/// The three buffers handed to a hashing engine.
#[derive(Debug, Clone)]
pub struct HashBuffers {
    /// SHA-256 state after absorbing the first 64 header bytes.
    pub midstate: [u8; 32],
    /// Padded, word-reversed 128-byte header image.
    pub data: [u8; 128],
    /// Pre-padded 64-byte buffer for the second hash.
    pub hash1: [u8; 64],
}

impl HashBuffers {
    /// Update the in-place timestamp image.
    pub fn set_time(&mut self, time: u32) {
        self.data[DATA_TIME_OFFSET..DATA_TIME_OFFSET + 4].copy_from_slice(&time.to_be_bytes());
    }

    /// Update the in-place compact-bits image.
    pub fn set_bits(&mut self, bits: u32) {
        self.data[DATA_BITS_OFFSET..DATA_BITS_OFFSET + 4].copy_from_slice(&bits.to_be_bytes());
    }

    /// Update the in-place nonce image.
    pub fn set_nonce(&mut self, nonce: u32) {
        self.data[DATA_NONCE_OFFSET..DATA_NONCE_OFFSET + 4].copy_from_slice(&nonce.to_be_bytes());
    }
}

/// Build the midstate/data/hash1 buffers for a header.
pub fn format_hash_buffers(header: &BlockHeader) -> HashBuffers {
    let serialized = header.serialize_classical();

    // 80-byte header padded to two SHA-256 blocks.
    let mut data = [0u8; 128];
    data[..80].copy_from_slice(&serialized);
    apply_sha256_padding(&mut data, 80);

    // Pre-padded buffer for the second hash of a 32-byte digest.
    let mut hash1 = [0u8; 64];
    apply_sha256_padding(&mut hash1, 32);

    // Midstate over the raw first block, before word reversal.
    let mut first_block = [0u8; 64];
    first_block.copy_from_slice(&data[..64]);
    let midstate = sha256_midstate(&first_block);

    reverse_words(&mut data);
    reverse_words(&mut hash1);

    HashBuffers {
        midstate,
        data,
        hash1,
    }
}

/// SHA-256 padding in place: terminator, zero fill, bit length big-endian
/// in the last four bytes.
fn apply_sha256_padding(buffer: &mut [u8], message_len: usize) {
    buffer[message_len] = 0x80;
    let bits = (message_len * 8) as u32;
    let end = buffer.len();
    buffer[end - 4..].copy_from_slice(&bits.to_be_bytes());
}

/// Byte-reverse every 32-bit word.
fn reverse_words(buffer: &mut [u8]) {
    for word in buffer.chunks_exact_mut(4) {
        word.reverse();
    }
}

/// SHA-256 compression state after one 64-byte block, serialized as
/// native-order words.
fn sha256_midstate(block: &[u8; 64]) -> [u8; 32] {
    let mut state = SHA256_INIT;
    let ga = GenericArray::clone_from_slice(block);
    compress256(&mut state, std::slice::from_ref(&ga));
    let mut out = [0u8; 32];
    for (i, word) in state.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    out
}
