//! Wallet error types.

use thiserror::Error;

/// Wallet errors.
#[derive(Error, Debug)]
pub enum WalletError {
    /// The key pool is exhausted and refill is disabled.
    #[error("key pool exhausted")]
    KeyPoolExhausted,
}

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;
