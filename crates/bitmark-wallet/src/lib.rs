//! # bitmark-wallet
//!
//! The key reservation service the miner draws coinbase keys from. A key
//! stays reserved by its worker until it is either committed with
//! [`Wallet::keep_key`] (a block was accepted) or handed back with
//! [`Wallet::return_key`].

mod error;
mod wallet;

pub use error::{WalletError, WalletResult};
pub use wallet::{PubKey, ReservedKey, Wallet};
