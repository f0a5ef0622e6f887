//! # bitmark-state
//!
//! Chain state for the Bitmark node:
//! - The active chain index with per-algorithm ancestry walks
//! - Difficulty retargeting and header timestamp rules
//! - The UTXO coin set and the layered view used during block assembly
//! - Input checking and (dry-run capable) block connection

mod chain;
mod coins;
mod error;
mod manager;
mod validate;

pub use chain::{BlockIndex, ChainIndex};
pub use coins::{Coins, CoinsCache, CoinsView, MemoryCoins, SpentOutput, TxUndo};
pub use error::{StateError, StateResult};
pub use manager::ChainState;
pub use validate::{
    check_inputs, connect_block, p2sh_sigop_count, SCRIPT_VERIFY_NONE, SCRIPT_VERIFY_P2SH,
};
