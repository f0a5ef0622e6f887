//! Coinbase construction and extra-nonce rolling.

use bitmark_chain::{
    coinbase_flags, Block, Hash256, OutPoint, Script, Transaction, TxIn, TxOut, OP_0, OP_CHECKSIG,
};
use bitmark_wallet::PubKey;

/// Coinbase output script paying to a raw public key.
pub fn coinbase_script_for_key(pubkey: &PubKey) -> Script {
    Script::new()
        .push_data(pubkey.as_bytes())
        .push_opcode(OP_CHECKSIG)
}

/// The initial coinbase for a fresh template: one null input, one output
/// carrying the payout script. The value is filled in after fees are
/// known, the scriptSig on every extra-nonce advance.
pub fn create_coinbase(script_pubkey: Script) -> Transaction {
    Transaction {
        version: 1,
        vin: vec![TxIn {
            prevout: OutPoint::null(),
            script_sig: Script::new().push_opcode(OP_0).push_opcode(OP_0),
            sequence: u32::MAX,
        }],
        vout: vec![TxOut::new(0, script_pubkey)],
        lock_time: 0,
    }
}

/// Extra-nonce state: the counter restarts whenever work moves to a new
/// previous block.
#[derive(Debug, Default, Clone)]
pub struct ExtraNonce {
    last_prev: Hash256,
    counter: u32,
}

impl ExtraNonce {
    /// Current counter value.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// Advance the extra-nonce and rewrite the coinbase scriptSig as
/// `height ++ counter ++ COINBASE_FLAGS`, then refresh the merkle root.
///
/// This is the only per-iteration change to the transaction set; the
/// scriptSig must stay within the 100-byte consensus bound.
pub fn increment_extra_nonce(block: &mut Block, prev_height: i32, state: &mut ExtraNonce) -> u32 {
    if state.last_prev != block.header.hash_prev_block {
        state.counter = 0;
        state.last_prev = block.header.hash_prev_block;
    }
    state.counter += 1;

    let height = prev_height + 1;
    let script_sig = Script::new()
        .push_int(height as i64)
        .push_int(state.counter as i64)
        .concat(&coinbase_flags());
    assert!(script_sig.len() <= 100);
    block.vtx[0].vin[0].script_sig = script_sig;

    block.header.hash_merkle_root = block.merkle_root();
    state.counter
}
