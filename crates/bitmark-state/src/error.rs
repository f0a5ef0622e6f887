//! State error types.

use thiserror::Error;

/// State errors.
#[derive(Error, Debug)]
pub enum StateError {
    /// A transaction input is not present in the coin view.
    #[error("inputs missing or already spent for {0}")]
    MissingInputs(String),

    /// A coinbase output was spent before maturity.
    #[error("coinbase spend at height {spend_height} is {depth} blocks deep, need {required}")]
    ImmatureCoinbase {
        /// Height of the spending block.
        spend_height: i32,
        /// Current depth of the coinbase.
        depth: i32,
        /// Required maturity depth.
        required: i32,
    },

    /// Input values are lower than output values.
    #[error("transaction {0} spends more than its inputs provide")]
    ValueOutOfRange(String),

    /// A P2SH input failed the script-shape check.
    #[error("transaction {0} has a non-push scriptSig on a P2SH input")]
    NonPushScriptSig(String),

    /// Block-level consensus check failed.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// The block does not extend the current tip.
    #[error("block {hash} does not extend the active tip")]
    NotExtendingTip {
        /// Hash of the rejected block.
        hash: String,
    },

    /// Proof of work does not satisfy the target.
    #[error("proof of work check failed for {0}")]
    BadProofOfWork(String),
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
