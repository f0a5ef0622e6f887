//! The UTXO coin set and the layered view used during block assembly.

use crate::error::{StateError, StateResult};
use bitmark_chain::{Hash256, OutPoint, Transaction, TxOut};
use std::collections::HashMap;

/// Unspent outputs of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coins {
    /// Outputs; `None` marks a spent slot.
    pub outputs: Vec<Option<TxOut>>,
    /// Height of the block that created the transaction.
    pub height: i32,
    /// Whether the creating transaction was a coinbase.
    pub is_coinbase: bool,
}

impl Coins {
    /// Coins created by applying `tx` at `height`.
    pub fn from_tx(tx: &Transaction, height: i32) -> Self {
        Coins {
            outputs: tx.vout.iter().cloned().map(Some).collect(),
            height,
            is_coinbase: tx.is_coinbase(),
        }
    }

    /// Whether output `n` exists and is unspent.
    pub fn is_available(&self, n: u32) -> bool {
        self.outputs
            .get(n as usize)
            .map(|o| o.is_some())
            .unwrap_or(false)
    }

    /// Take output `n`, marking it spent.
    pub fn spend(&mut self, n: u32) -> Option<TxOut> {
        self.outputs.get_mut(n as usize).and_then(|o| o.take())
    }

    /// Whether every output has been spent.
    pub fn is_pruned(&self) -> bool {
        self.outputs.iter().all(|o| o.is_none())
    }
}

/// Read access to a coin set.
pub trait CoinsView {
    /// Coins of a transaction, if any output survives.
    fn get_coins(&self, txid: &Hash256) -> Option<Coins>;

    /// Whether the transaction has surviving outputs.
    fn have_coins(&self, txid: &Hash256) -> bool {
        self.get_coins(txid).is_some()
    }
}

/// The committed in-memory coin set.
#[derive(Debug, Default)]
pub struct MemoryCoins {
    map: HashMap<Hash256, Coins>,
}

impl MemoryCoins {
    /// Create an empty coin set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the coins of a transaction.
    pub fn insert(&mut self, txid: Hash256, coins: Coins) {
        if coins.is_pruned() {
            self.map.remove(&txid);
        } else {
            self.map.insert(txid, coins);
        }
    }

    /// Absorb modified entries from a cache layer.
    pub fn absorb(&mut self, entries: HashMap<Hash256, Coins>) {
        for (txid, coins) in entries {
            self.insert(txid, coins);
        }
    }

    /// Number of transactions with unspent outputs.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl CoinsView for MemoryCoins {
    fn get_coins(&self, txid: &Hash256) -> Option<Coins> {
        self.map.get(txid).cloned()
    }

    fn have_coins(&self, txid: &Hash256) -> bool {
        self.map.contains_key(txid)
    }
}

/// One spent output recorded for undo.
#[derive(Debug, Clone)]
pub struct SpentOutput {
    /// Where the output lived.
    pub prevout: OutPoint,
    /// The output itself.
    pub output: TxOut,
    /// Creation height of the spent coin.
    pub height: i32,
    /// Whether the spent coin was a coinbase output.
    pub is_coinbase: bool,
}

/// Undo record for one applied transaction.
#[derive(Debug, Clone, Default)]
pub struct TxUndo {
    /// Outputs consumed by the transaction, in input order.
    pub spent: Vec<SpentOutput>,
}

/// A mutable view layered over a committed coin set.
///
/// Reads fall through to the base; writes stay in the cache until the
/// caller either discards the view (template building, dry connects) or
/// absorbs it into the base (block acceptance).
pub struct CoinsCache<'a> {
    base: &'a dyn CoinsView,
    cache: HashMap<Hash256, Coins>,
}

impl<'a> CoinsCache<'a> {
    /// Create a view over `base`.
    pub fn new(base: &'a dyn CoinsView) -> Self {
        CoinsCache {
            base,
            cache: HashMap::new(),
        }
    }

    fn fetch(&mut self, txid: &Hash256) -> Option<&mut Coins> {
        if !self.cache.contains_key(txid) {
            let coins = self.base.get_coins(txid)?;
            self.cache.insert(*txid, coins);
        }
        self.cache.get_mut(txid)
    }

    /// Whether the transaction has surviving outputs in this view.
    pub fn have_coins(&mut self, txid: &Hash256) -> bool {
        self.fetch(txid).map(|c| !c.is_pruned()).unwrap_or(false)
    }

    /// Coins of a transaction in this view.
    pub fn coins(&mut self, txid: &Hash256) -> Option<&Coins> {
        self.fetch(txid).map(|c| &*c)
    }

    /// Whether every input of `tx` is available in this view.
    pub fn have_inputs(&mut self, tx: &Transaction) -> bool {
        if tx.is_coinbase() {
            return true;
        }
        tx.vin.iter().all(|input| {
            let prevout = input.prevout;
            match self.fetch(&prevout.hash) {
                Some(coins) => coins.is_available(prevout.n),
                None => false,
            }
        })
    }

    /// Sum of input values of `tx` in this view.
    ///
    /// Precondition: `have_inputs(tx)` holds.
    pub fn value_in(&mut self, tx: &Transaction) -> i64 {
        if tx.is_coinbase() {
            return 0;
        }
        tx.vin
            .iter()
            .map(|input| {
                self.fetch(&input.prevout.hash)
                    .and_then(|c| c.outputs.get(input.prevout.n as usize).cloned().flatten())
                    .map(|o| o.value)
                    .unwrap_or(0)
            })
            .sum()
    }

    /// Apply `tx` at `height`: spend its inputs, create its outputs.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        height: i32,
        txid: &Hash256,
    ) -> StateResult<TxUndo> {
        let mut undo = TxUndo::default();
        if !tx.is_coinbase() {
            for input in &tx.vin {
                let prevout = input.prevout;
                let coins = self
                    .fetch(&prevout.hash)
                    .ok_or_else(|| StateError::MissingInputs(prevout.hash.to_string()))?;
                let coin_height = coins.height;
                let coin_coinbase = coins.is_coinbase;
                let output = coins
                    .spend(prevout.n)
                    .ok_or_else(|| StateError::MissingInputs(prevout.hash.to_string()))?;
                undo.spent.push(SpentOutput {
                    prevout,
                    output,
                    height: coin_height,
                    is_coinbase: coin_coinbase,
                });
            }
        }
        self.cache.insert(*txid, Coins::from_tx(tx, height));
        Ok(undo)
    }

    /// Consume the view, yielding the modified entries.
    pub fn into_entries(self) -> HashMap<Hash256, Coins> {
        self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitmark_chain::{sha256d, Script, TxIn};

    fn funded_base() -> (MemoryCoins, Hash256, Transaction) {
        let funding = Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::null())],
            vout: vec![
                TxOut::new(60_000, Script::new()),
                TxOut::new(40_000, Script::new()),
            ],
            lock_time: 0,
        };
        let txid = funding.txid();
        let mut base = MemoryCoins::new();
        base.insert(txid, Coins::from_tx(&funding, 10));
        (base, txid, funding)
    }

    fn spend_of(txid: Hash256, n: u32, value: i64) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::new(txid, n))],
            vout: vec![TxOut::new(value, Script::new())],
            lock_time: 0,
        }
    }

    #[test]
    fn test_cache_reads_through() {
        let (base, txid, _) = funded_base();
        let mut view = CoinsCache::new(&base);
        assert!(view.have_coins(&txid));
        assert!(!view.have_coins(&sha256d(b"unknown")));
    }

    #[test]
    fn test_apply_spends_and_creates() {
        let (base, txid, _) = funded_base();
        let mut view = CoinsCache::new(&base);

        let spend = spend_of(txid, 0, 55_000);
        assert!(view.have_inputs(&spend));
        assert_eq!(view.value_in(&spend), 60_000);

        let spend_id = spend.txid();
        let undo = view.apply_transaction(&spend, 11, &spend_id).unwrap();
        assert_eq!(undo.spent.len(), 1);
        assert_eq!(undo.spent[0].output.value, 60_000);
        assert_eq!(undo.spent[0].height, 10);

        // Output 0 is gone, output 1 survives, the new coin exists.
        assert!(!view.have_inputs(&spend));
        assert!(view.coins(&txid).unwrap().is_available(1));
        assert!(view.have_coins(&spend_id));

        // The base is untouched until absorbed.
        assert!(base.get_coins(&txid).unwrap().is_available(0));
    }

    #[test]
    fn test_double_spend_in_view_fails() {
        let (base, txid, _) = funded_base();
        let mut view = CoinsCache::new(&base);
        let spend = spend_of(txid, 0, 55_000);
        let spend_id = spend.txid();
        view.apply_transaction(&spend, 11, &spend_id).unwrap();

        let again = spend_of(txid, 0, 54_000);
        let again_id = again.txid();
        assert!(view.apply_transaction(&again, 11, &again_id).is_err());
    }

    #[test]
    fn test_absorb_prunes_empty_entries() {
        let (mut base, txid, _) = funded_base();
        let mut view = CoinsCache::new(&base);

        let a = spend_of(txid, 0, 1);
        let b = spend_of(txid, 1, 1);
        let a_id = a.txid();
        let b_id = b.txid();
        view.apply_transaction(&a, 11, &a_id).unwrap();
        view.apply_transaction(&b, 11, &b_id).unwrap();

        let entries = view.into_entries();
        base.absorb(entries);
        assert!(!base.have_coins(&txid));
        assert!(base.have_coins(&a_id));
        assert!(base.have_coins(&b_id));
    }
}
