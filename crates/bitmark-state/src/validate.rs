//! Input checking and block connection.
//!
//! Script execution is the full validator's concern; these checks are
//! limited to availability, maturity, value balance, and the script-shape
//! rules selected by the verification flags.

use crate::coins::CoinsCache;
use crate::error::{StateError, StateResult};
use bitmark_chain::{
    Block, ChainParams, Script, Transaction, COINBASE_MATURITY, MAX_BLOCK_SIGOPS, MAX_BLOCK_SIZE,
};
use tracing::debug;

/// No script verification flags.
pub const SCRIPT_VERIFY_NONE: u32 = 0;
/// Enforce pay-to-script-hash rules.
pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;

/// Check the inputs of `tx` against the view.
pub fn check_inputs(
    tx: &Transaction,
    view: &mut CoinsCache<'_>,
    spend_height: i32,
    flags: u32,
) -> StateResult<()> {
    if tx.is_coinbase() {
        return Ok(());
    }
    if !view.have_inputs(tx) {
        return Err(StateError::MissingInputs(tx.txid().to_string()));
    }
    for input in &tx.vin {
        let coins = view
            .coins(&input.prevout.hash)
            .ok_or_else(|| StateError::MissingInputs(input.prevout.hash.to_string()))?;
        if coins.is_coinbase {
            let depth = spend_height - coins.height;
            if depth < COINBASE_MATURITY {
                return Err(StateError::ImmatureCoinbase {
                    spend_height,
                    depth,
                    required: COINBASE_MATURITY,
                });
            }
        }
        if flags & SCRIPT_VERIFY_P2SH != 0 {
            let is_p2sh = view
                .coins(&input.prevout.hash)
                .and_then(|c| c.outputs.get(input.prevout.n as usize).cloned().flatten())
                .map(|o| o.script_pubkey.is_pay_to_script_hash())
                .unwrap_or(false);
            if is_p2sh && !input.script_sig.is_push_only() {
                return Err(StateError::NonPushScriptSig(tx.txid().to_string()));
            }
        }
    }
    if view.value_in(tx) < tx.value_out() {
        return Err(StateError::ValueOutOfRange(tx.txid().to_string()));
    }
    Ok(())
}

/// Pay-to-script-hash signature operations of `tx` against the view.
pub fn p2sh_sigop_count(tx: &Transaction, view: &mut CoinsCache<'_>) -> u32 {
    if tx.is_coinbase() {
        return 0;
    }
    let mut count = 0;
    for input in &tx.vin {
        let Some(prev_script) = view
            .coins(&input.prevout.hash)
            .and_then(|c| c.outputs.get(input.prevout.n as usize).cloned().flatten())
            .map(|o| o.script_pubkey)
        else {
            continue;
        };
        if !prev_script.is_pay_to_script_hash() {
            continue;
        }
        if let Some(redeem) = input.script_sig.last_push() {
            count += Script::from_bytes(redeem).sigop_count(true);
        }
    }
    count
}

/// Connect a block on top of the view, applying every transaction.
///
/// The view carries all the effect; callers connect dry by handing in a
/// disposable cache. Returns the fees collected by the block.
pub fn connect_block(
    block: &Block,
    view: &mut CoinsCache<'_>,
    height: i32,
    params: &ChainParams,
) -> StateResult<i64> {
    let first_is_coinbase = block.vtx.first().map(|tx| tx.is_coinbase()).unwrap_or(false);
    if !first_is_coinbase {
        return Err(StateError::InvalidBlock(
            "first transaction is not a coinbase".to_string(),
        ));
    }
    if block.vtx.iter().skip(1).any(|tx| tx.is_coinbase()) {
        return Err(StateError::InvalidBlock(
            "multiple coinbase transactions".to_string(),
        ));
    }
    if block.serialized_size() > MAX_BLOCK_SIZE {
        return Err(StateError::InvalidBlock("block oversized".to_string()));
    }

    let mut sigops: u64 = 0;
    let mut fees: i64 = 0;
    for (i, tx) in block.vtx.iter().enumerate() {
        sigops += tx.legacy_sigop_count() as u64;
        if i > 0 {
            if !view.have_inputs(tx) {
                return Err(StateError::MissingInputs(tx.txid().to_string()));
            }
            sigops += p2sh_sigop_count(tx, view) as u64;
            check_inputs(tx, view, height, SCRIPT_VERIFY_P2SH)?;
            fees += view.value_in(tx) - tx.value_out();
        }
        if sigops > MAX_BLOCK_SIGOPS as u64 {
            return Err(StateError::InvalidBlock("too many sigops".to_string()));
        }
        let txid = tx.txid();
        view.apply_transaction(tx, height, &txid)?;
    }

    let allowed = params.block_value(height, fees);
    let claimed = block.vtx[0].value_out();
    if claimed > allowed {
        return Err(StateError::InvalidBlock(format!(
            "coinbase claims {claimed}, allowed {allowed}"
        )));
    }
    debug!(height, fees, txs = block.vtx.len(), "connected block");
    Ok(fees)
}
