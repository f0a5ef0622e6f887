//! Mempool error types.

use thiserror::Error;

/// Mempool errors.
#[derive(Error, Debug)]
pub enum MempoolError {
    /// The transaction is already in the pool.
    #[error("transaction {0} already in mempool")]
    AlreadyKnown(String),

    /// A coinbase can never enter the pool.
    #[error("coinbase transaction {0} rejected")]
    Coinbase(String),
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
