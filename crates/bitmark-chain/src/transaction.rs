//! Transactions and their canonical serialization.

use crate::hash::{sha256d, Hash256};
use crate::params::LOCKTIME_THRESHOLD;
use crate::script::Script;
use crate::ser::{compact_size_len, write_compact_size};

/// A reference to a transaction output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OutPoint {
    /// Transaction id of the referenced output.
    pub hash: Hash256,
    /// Output index.
    pub n: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs.
    pub fn null() -> Self {
        OutPoint {
            hash: Hash256::ZERO,
            n: u32::MAX,
        }
    }

    /// Whether this is the coinbase null outpoint.
    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.n == u32::MAX
    }

    /// Create an outpoint.
    pub fn new(hash: Hash256, n: u32) -> Self {
        OutPoint { hash, n }
    }
}

/// A transaction input.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TxIn {
    /// Spent output.
    pub prevout: OutPoint,
    /// Unlocking script.
    pub script_sig: Script,
    /// Sequence number.
    pub sequence: u32,
}

impl TxIn {
    /// Create an input spending `prevout` with an empty scriptSig.
    pub fn new(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Script::new(),
            sequence: u32::MAX,
        }
    }
}

/// A transaction output.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TxOut {
    /// Value in the smallest currency unit.
    pub value: i64,
    /// Locking script.
    pub script_pubkey: Script,
}

impl TxOut {
    /// Create an output.
    pub fn new(value: i64, script_pubkey: Script) -> Self {
        TxOut {
            value,
            script_pubkey,
        }
    }
}

/// A transaction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transaction {
    /// Transaction format version.
    pub version: i32,
    /// Inputs.
    pub vin: Vec<TxIn>,
    /// Outputs.
    pub vout: Vec<TxOut>,
    /// Lock time (height or timestamp, split at [`LOCKTIME_THRESHOLD`]).
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction {
            version: 1,
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: 0,
        }
    }
}

impl Transaction {
    /// Whether this transaction mints new coins.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// Sum of output values.
    pub fn value_out(&self) -> i64 {
        self.vout.iter().map(|o| o.value).sum()
    }

    /// Whether the transaction is final at the given height and time.
    pub fn is_final_at(&self, height: i32, time: u64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let cutoff = if self.lock_time < LOCKTIME_THRESHOLD {
            height as i64
        } else {
            time as i64
        };
        if (self.lock_time as i64) < cutoff {
            return true;
        }
        self.vin.iter().all(|i| i.sequence == u32::MAX)
    }

    /// Transaction id: double SHA-256 of the serialization.
    pub fn txid(&self) -> Hash256 {
        sha256d(&self.to_bytes())
    }

    /// Serialize into `out`.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(out, self.vin.len() as u64);
        for input in &self.vin {
            out.extend_from_slice(input.prevout.hash.as_bytes());
            out.extend_from_slice(&input.prevout.n.to_le_bytes());
            write_compact_size(out, input.script_sig.len() as u64);
            out.extend_from_slice(input.script_sig.as_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(out, self.vout.len() as u64);
        for output in &self.vout {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_compact_size(out, output.script_pubkey.len() as u64);
            out.extend_from_slice(output.script_pubkey.as_bytes());
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }

    /// Serialize to a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_size());
        self.serialize(&mut out);
        out
    }

    /// Serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + 4; // version + lock_time
        size += compact_size_len(self.vin.len() as u64);
        for input in &self.vin {
            size += 32 + 4 + compact_size_len(input.script_sig.len() as u64)
                + input.script_sig.len()
                + 4;
        }
        size += compact_size_len(self.vout.len() as u64);
        for output in &self.vout {
            size += 8
                + compact_size_len(output.script_pubkey.len() as u64)
                + output.script_pubkey.len();
        }
        size
    }

    /// Count legacy (non-P2SH) signature operations.
    pub fn legacy_sigop_count(&self) -> u32 {
        let mut count = 0;
        for input in &self.vin {
            count += input.script_sig.sigop_count(false);
        }
        for output in &self.vout {
            count += output.script_pubkey.sigop_count(false);
        }
        count
    }

    /// Size with the per-input free allowance deducted.
    ///
    /// Deducting the constant input overhead plus up to 110 scriptSig bytes
    /// keeps padded transactions from gaining priority from their own bulk.
    pub fn modified_size(&self) -> usize {
        let mut size = self.serialized_size();
        for input in &self.vin {
            let offset = 41 + input.script_sig.len().min(110);
            if size > offset {
                size -= offset;
            }
        }
        size
    }

    /// Priority from the accumulated `value x confirmations` of the inputs.
    pub fn compute_priority(&self, input_priority_sum: f64) -> f64 {
        let modified = self.modified_size();
        if modified == 0 {
            0.0
        } else {
            input_priority_sum / modified as f64
        }
    }
}
