//! Mining error types.

use thiserror::Error;

/// Mining errors.
#[derive(Error, Debug)]
pub enum MiningError {
    /// The submitted block no longer extends the active tip.
    #[error("generated block is stale")]
    Stale,

    /// The validator rejected a submitted block.
    #[error("block not accepted: {0}")]
    Rejected(String),

    /// Template construction failed its final consistency check.
    #[error("template failed dry connect: {0}")]
    TemplateFailed(String),

    /// No coinbase key could be reserved.
    #[error(transparent)]
    KeyUnavailable(#[from] bitmark_wallet::WalletError),

    /// State error during template construction or submission.
    #[error(transparent)]
    State(#[from] bitmark_state::StateError),

    /// The supervisor interrupted the worker.
    #[error("miner interrupted")]
    Interrupted,
}

/// Result type for mining operations.
pub type MiningResult<T> = Result<T, MiningError>;
