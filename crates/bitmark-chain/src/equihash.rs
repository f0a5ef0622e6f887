//! Equihash (n, k) parameters, solution encoding, and validation.
//!
//! A solution is a set of `2^k` distinct indices whose Blake2b-derived
//! n-bit strings XOR to zero under the per-round collision constraints.
//! Indices travel in a minimal byte representation packing each index into
//! `n/(k+1) + 1` bits.

use blake2b_simd::{Params as Blake2bParams, State as Blake2bState};

/// Equihash parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquihashParams {
    /// Width of the generated hash strings in bits.
    pub n: u32,
    /// Number of collision rounds; solutions contain `2^k` indices.
    pub k: u32,
}

impl EquihashParams {
    /// Create parameters. `n` must be a multiple of `k + 1` and small
    /// enough that a digit fits a `u32`.
    pub fn new(n: u32, k: u32) -> Self {
        debug_assert!(k >= 1 && k < n);
        debug_assert!(n % (k + 1) == 0);
        debug_assert!(n / (k + 1) <= 25);
        EquihashParams { n, k }
    }

    /// Bits per collision digit.
    pub fn digit_bits(&self) -> usize {
        (self.n / (self.k + 1)) as usize
    }

    /// Number of digits in a hash string.
    pub fn digits(&self) -> usize {
        (self.k + 1) as usize
    }

    /// Indices per solution.
    pub fn proof_size(&self) -> usize {
        1usize << self.k
    }

    /// Index strings produced by a single Blake2b invocation.
    pub fn indices_per_hash_output(&self) -> usize {
        (512 / self.n) as usize
    }

    /// Blake2b output length in bytes.
    pub fn hash_output(&self) -> usize {
        self.indices_per_hash_output() * (self.n as usize) / 8
    }

    /// Bytes per packed solution index.
    pub fn index_bit_len(&self) -> usize {
        self.digit_bits() + 1
    }

    /// Serialized solution width in bytes.
    pub fn solution_width(&self) -> usize {
        self.proof_size() * self.index_bit_len() / 8
    }

    /// Size of the initial index space (`2^(digit_bits + 1)`).
    pub fn index_count(&self) -> u32 {
        1u32 << (self.digit_bits() + 1)
    }
}

/// Blake2b state seeded with the Equihash personalization for `(n, k)`.
pub fn initialise_state(params: &EquihashParams) -> Blake2bState {
    let mut personal = [0u8; 16];
    personal[..8].copy_from_slice(b"ZcashPoW");
    personal[8..12].copy_from_slice(&params.n.to_le_bytes());
    personal[12..16].copy_from_slice(&params.k.to_le_bytes());
    Blake2bParams::new()
        .hash_length(params.hash_output())
        .personal(&personal)
        .to_state()
}

/// The n-bit hash string for `index`, split into collision digits.
///
/// One Blake2b call covers several indices, each owning an n-bit slice of
/// the output; this is the generation rule shared by solving and
/// validation.
pub fn hash_digits(params: &EquihashParams, state: &Blake2bState, index: u32) -> Vec<u32> {
    let per_blake = params.indices_per_hash_output() as u32;
    let mut state = state.clone();
    state.update(&(index / per_blake).to_le_bytes());
    let hash = state.finalize();

    let n_bytes = (params.n as usize) / 8;
    let offset = (index % per_blake) as usize * n_bytes;
    let slice = &hash.as_bytes()[offset..offset + n_bytes];
    split_digits(params, slice)
}

/// Split an n-bit big-endian string into its collision digits.
fn split_digits(params: &EquihashParams, bytes: &[u8]) -> Vec<u32> {
    let digit_bits = params.digit_bits();
    let mut digits = Vec::with_capacity(params.digits());
    let mut acc: u64 = 0;
    let mut acc_bits = 0usize;
    let mut iter = bytes.iter();
    for _ in 0..params.digits() {
        while acc_bits < digit_bits {
            acc = (acc << 8) | *iter.next().expect("exact digit packing") as u64;
            acc_bits += 8;
        }
        acc_bits -= digit_bits;
        digits.push((acc >> acc_bits) as u32 & ((1u32 << digit_bits) - 1));
    }
    digits
}

/// Pack index values into the minimal solution representation.
pub fn minimal_from_indices(indices: &[u32], bit_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(indices.len() * bit_len / 8);
    let mut acc: u64 = 0;
    let mut acc_bits = 0usize;
    for &index in indices {
        acc = (acc << bit_len) | index as u64;
        acc_bits += bit_len;
        while acc_bits >= 8 {
            acc_bits -= 8;
            out.push((acc >> acc_bits) as u8);
        }
    }
    out
}

/// Unpack a minimal solution representation into index values.
///
/// Returns `None` when the blob length does not match an exact multiple of
/// the index width.
pub fn indices_from_minimal(minimal: &[u8], bit_len: usize) -> Option<Vec<u32>> {
    if minimal.len() * 8 % bit_len != 0 {
        return None;
    }
    let count = minimal.len() * 8 / bit_len;
    let mut out = Vec::with_capacity(count);
    let mut acc: u64 = 0;
    let mut acc_bits = 0usize;
    for &byte in minimal {
        acc = (acc << 8) | byte as u64;
        acc_bits += 8;
        while acc_bits >= bit_len {
            acc_bits -= bit_len;
            out.push((acc >> acc_bits) as u32 & ((1u32 << bit_len) - 1));
        }
    }
    Some(out)
}

/// Validate a minimal-encoded solution against a state that has already
/// absorbed the header and nonce.
pub fn is_valid_solution(
    params: &EquihashParams,
    state: &Blake2bState,
    solution: &[u8],
) -> bool {
    if solution.len() != params.solution_width() {
        return false;
    }
    let Some(indices) = indices_from_minimal(solution, params.index_bit_len()) else {
        return false;
    };
    if indices.len() != params.proof_size() {
        return false;
    }

    // All indices distinct and within the generation domain.
    let mut seen = std::collections::HashSet::with_capacity(indices.len());
    for &index in &indices {
        if index >= params.index_count() || !seen.insert(index) {
            return false;
        }
    }

    // Leaf rows: (xor-accumulated digits, minimal index in the subtree).
    let mut rows: Vec<(Vec<u32>, u32)> = indices
        .iter()
        .map(|&i| (hash_digits(params, state, i), i))
        .collect();

    for round in 0..params.digits() - 1 {
        let mut next = Vec::with_capacity(rows.len() / 2);
        for pair in rows.chunks(2) {
            let (left, right) = (&pair[0], &pair[1]);
            // Ordering constraint: the left subtree owns the smaller index.
            if left.1 >= right.1 {
                return false;
            }
            let xor: Vec<u32> = left
                .0
                .iter()
                .zip(right.0.iter())
                .map(|(a, b)| a ^ b)
                .collect();
            // Digits up to and including this round must have cancelled.
            if xor[..=round].iter().any(|d| *d != 0) {
                return false;
            }
            next.push((xor, left.1));
        }
        rows = next;
    }

    // The root XOR must be zero across every digit.
    rows.len() == 1 && rows[0].0.iter().all(|d| *d == 0)
}
