//! # bitmark-mining
//!
//! Block assembly and proof-of-work search for the Bitmark node.
//!
//! This crate provides:
//! - An ancestor-aware priority queue over the mempool
//! - The block template builder (coinbase, ordering, fork flags)
//! - Extra-nonce rolling and the legacy midstate hash buffers
//! - Search drivers for the classical double-hash loop and the Equihash
//!   solver
//! - The miner supervisor: worker threads, hash metering, staleness
//!   handling, and block submission

mod buffers;
mod coinbase;
mod error;
mod miner;
mod queue;
mod search;
mod solver;
mod template;
mod traits;
mod worker;

pub use buffers::{format_hash_buffers, HashBuffers};
pub use coinbase::{coinbase_script_for_key, create_coinbase, increment_extra_nonce, ExtraNonce};
pub use error::{MiningError, MiningResult};
pub use miner::{check_work, HashMeter, Miner, MinerContext, MinerState};
pub use queue::{TxPriority, TxPriorityQueue};
pub use search::{
    classical_round, equihash_round, BestHash, RoundResult, SolutionAction, SolverSession,
};
pub use solver::EquihashSolver;
pub use template::{AssemblerConfig, BlockAssembler, BlockTemplate};
pub use traits::{PeerSet, StaticPeerSet};

/// Classical nonce value past which the domain is treated as exhausted.
pub const NONCE_EXHAUSTED: u32 = 0xffff_0000;

/// Seconds a template survives mempool drift before it is rebuilt.
pub const TEMPLATE_REFRESH_SECS: u64 = 60;
