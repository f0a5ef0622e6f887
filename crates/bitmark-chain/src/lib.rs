//! # bitmark-chain
//!
//! Core chain types and consensus math for the Bitmark node.
//!
//! This crate provides:
//! - 256-bit hashes and double-SHA-256
//! - Script building (coinbase scriptSigs, sig-op counting)
//! - Transactions, blocks, and canonical wire serialization
//! - Compact difficulty bits and proof-of-work checks for every
//!   supported mining algorithm
//! - Equihash parameters, solution encoding, and solution validation
//! - Per-network chain parameters and the subsidy schedule

mod block;
mod compact;
mod equihash;
mod hash;
mod params;
mod pow;
mod script;
pub(crate) mod ser;
mod transaction;

pub use block::{
    merkle_root, version_algo, version_update_ssf, Block, BlockHeader, BLOCK_VERSION_DEFAULT,
    VERSION_UPDATE_SSF,
};
pub use compact::{compact_to_target, hash_to_biguint, target_to_compact};
pub use equihash::{
    hash_digits, indices_from_minimal, initialise_state, is_valid_solution,
    minimal_from_indices, EquihashParams,
};
pub use hash::{sha256d, Hash256};
pub use params::{
    allow_free, coinbase_flags, ChainParams, Network, COIN, COINBASE_MATURITY,
    DEFAULT_BLOCK_MAX_SIZE, DEFAULT_BLOCK_MIN_SIZE, DEFAULT_BLOCK_PRIORITY_SIZE,
    FREE_TX_PRIORITY_THRESHOLD, LOCKTIME_THRESHOLD, MAX_BLOCK_SIGOPS, MAX_BLOCK_SIZE,
    PROTOCOL_VERSION,
};
pub use pow::{check_proof_of_work, pow_hash, Algo, NonceShape};
pub use script::{Script, OP_0, OP_CHECKSIG, OP_EQUAL, OP_HASH160};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};
