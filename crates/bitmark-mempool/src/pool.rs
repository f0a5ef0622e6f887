//! Transaction pool implementation.

use crate::{MempoolError, MempoolResult};
use bitmark_chain::{Block, Hash256, Transaction};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A pooled transaction with its acceptance metadata.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    /// The transaction.
    pub tx: Arc<Transaction>,
    /// Fee paid, in the smallest currency unit.
    pub fee: i64,
    /// Chain height when the transaction arrived.
    pub height: i32,
    /// Arrival time, unix seconds.
    pub time: u64,
}

/// The transaction memory pool.
#[derive(Debug, Default)]
pub struct Mempool {
    map: DashMap<Hash256, MempoolEntry>,
    updated: AtomicU64,
}

impl Mempool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction.
    pub fn insert(&self, tx: Transaction, fee: i64, height: i32, time: u64) -> MempoolResult<Hash256> {
        let txid = tx.txid();
        if tx.is_coinbase() {
            return Err(MempoolError::Coinbase(txid.to_string()));
        }
        if self.map.contains_key(&txid) {
            return Err(MempoolError::AlreadyKnown(txid.to_string()));
        }
        self.map.insert(
            txid,
            MempoolEntry {
                tx: Arc::new(tx),
                fee,
                height,
                time,
            },
        );
        self.updated.fetch_add(1, Ordering::SeqCst);
        debug!(tx = %txid, fee, "mempool accepted transaction");
        Ok(txid)
    }

    /// Remove a transaction, if present.
    pub fn remove(&self, txid: &Hash256) {
        if self.map.remove(txid).is_some() {
            self.updated.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Evict every transaction included in a connected block.
    pub fn remove_for_block(&self, block: &Block) {
        for tx in block.vtx.iter().skip(1) {
            self.remove(&tx.txid());
        }
    }

    /// Whether `txid` is pooled.
    pub fn contains(&self, txid: &Hash256) -> bool {
        self.map.contains_key(txid)
    }

    /// Entry for `txid`, if pooled.
    pub fn get(&self, txid: &Hash256) -> Option<MempoolEntry> {
        self.map.get(txid).map(|e| e.value().clone())
    }

    /// Value of a pooled transaction output, if present.
    pub fn output_value(&self, txid: &Hash256, n: u32) -> Option<i64> {
        self.map
            .get(txid)
            .and_then(|e| e.tx.vout.get(n as usize).map(|o| o.value))
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Monotone counter bumped on every mutation; template staleness
    /// detection compares snapshots of this value.
    pub fn transactions_updated(&self) -> u64 {
        self.updated.load(Ordering::SeqCst)
    }

    /// Snapshot of the pool contents.
    pub fn entries(&self) -> Vec<(Hash256, MempoolEntry)> {
        self.map
            .iter()
            .map(|item| (*item.key(), item.value().clone()))
            .collect()
    }
}
