//! Key pool and reservation bookkeeping.
//!
//! Key material is carried as opaque compressed-point bytes; signing and
//! derivation belong to the full wallet, which is outside the mining
//! engine. The engine only embeds the public key in coinbase scripts.

use crate::{WalletError, WalletResult};
use bitmark_chain::Hash256;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// A compressed public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubKey(pub Vec<u8>);

impl PubKey {
    /// Key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A key handed out to a miner worker, held until kept or returned.
#[derive(Debug, Clone)]
pub struct ReservedKey {
    /// Reservation id.
    pub id: u64,
    /// The reserved public key.
    pub pubkey: PubKey,
}

#[derive(Default)]
struct WalletInner {
    pool: VecDeque<(u64, PubKey)>,
    reserved: HashMap<u64, PubKey>,
    request_counts: HashMap<Hash256, u64>,
    next_id: u64,
}

/// The miner-facing wallet surface.
pub struct Wallet {
    inner: Mutex<WalletInner>,
    auto_refill: bool,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    /// Create a wallet that refills its key pool on demand.
    pub fn new() -> Self {
        Wallet {
            inner: Mutex::new(WalletInner::default()),
            auto_refill: true,
        }
    }

    /// Create a wallet with a fixed pool of `size` keys and no refill.
    pub fn with_fixed_pool(size: usize) -> Self {
        let wallet = Wallet {
            inner: Mutex::new(WalletInner::default()),
            auto_refill: false,
        };
        {
            let mut inner = wallet.inner.lock();
            for _ in 0..size {
                let entry = fresh_key(&mut inner.next_id);
                inner.pool.push_back(entry);
            }
        }
        wallet
    }

    /// Reserve a key for coinbase use.
    pub fn reserve_key(&self) -> WalletResult<ReservedKey> {
        let mut inner = self.inner.lock();
        let (id, pubkey) = match inner.pool.pop_front() {
            Some(entry) => entry,
            None if self.auto_refill => fresh_key(&mut inner.next_id),
            None => return Err(WalletError::KeyPoolExhausted),
        };
        inner.reserved.insert(id, pubkey.clone());
        debug!(id, "reserved coinbase key");
        Ok(ReservedKey { id, pubkey })
    }

    /// Commit a reserved key: it is spent and leaves the pool for good.
    pub fn keep_key(&self, id: u64) {
        let mut inner = self.inner.lock();
        if inner.reserved.remove(&id).is_some() {
            debug!(id, "kept coinbase key");
        }
    }

    /// Hand a reserved key back to the front of the pool.
    pub fn return_key(&self, id: u64) {
        let mut inner = self.inner.lock();
        if let Some(pubkey) = inner.reserved.remove(&id) {
            inner.pool.push_front((id, pubkey));
        }
    }

    /// Reset the relay request counter for a freshly mined block.
    pub fn mark_request_zero(&self, block_hash: Hash256) {
        self.inner.lock().request_counts.insert(block_hash, 0);
    }

    /// Relay request counter for a block, if tracked.
    pub fn request_count(&self, block_hash: &Hash256) -> Option<u64> {
        self.inner.lock().request_counts.get(block_hash).copied()
    }

    /// Number of keys waiting in the pool.
    pub fn pool_size(&self) -> usize {
        self.inner.lock().pool.len()
    }
}

fn fresh_key(next_id: &mut u64) -> (u64, PubKey) {
    let id = *next_id;
    *next_id += 1;
    let mut bytes = vec![0u8; 33];
    rand::thread_rng().fill_bytes(&mut bytes[1..]);
    bytes[0] = if bytes[1] & 1 == 0 { 0x02 } else { 0x03 };
    (id, PubKey(bytes))
}
