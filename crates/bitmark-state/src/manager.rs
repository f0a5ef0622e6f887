//! Chain state manager.

use crate::chain::ChainIndex;
use crate::coins::{Coins, CoinsCache, MemoryCoins};
use crate::error::{StateError, StateResult};
use crate::validate::connect_block;
use bitmark_chain::{
    check_proof_of_work, initialise_state, is_valid_solution, pow_hash, Algo, Block, ChainParams,
    Hash256,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// The node's view of the active chain and its coin set.
///
/// Lock order is chain before coins; both are taken together wherever a
/// consistent snapshot matters.
pub struct ChainState {
    params: ChainParams,
    chain: RwLock<ChainIndex>,
    coins: RwLock<MemoryCoins>,
}

impl ChainState {
    /// Create an empty chain state.
    pub fn new(params: ChainParams) -> Self {
        ChainState {
            params,
            chain: RwLock::new(ChainIndex::new()),
            coins: RwLock::new(MemoryCoins::new()),
        }
    }

    /// Create a chain state bootstrapped with a genesis block.
    ///
    /// The genesis block is accepted as-is; proof of work is not checked.
    pub fn with_genesis(params: ChainParams, genesis: &Block) -> StateResult<Self> {
        let state = Self::new(params);
        {
            let mut chain = state.chain.write();
            let mut coins = state.coins.write();
            let header = &genesis.header;
            chain.push(genesis.hash(), header.version, header.time, header.bits);
            for tx in &genesis.vtx {
                coins.insert(tx.txid(), Coins::from_tx(tx, 0));
            }
        }
        Ok(state)
    }

    /// Chain parameters.
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Read access to the chain index.
    pub fn chain(&self) -> RwLockReadGuard<'_, ChainIndex> {
        self.chain.read()
    }

    /// Write access to the chain index (bootstrap and test fixtures).
    pub fn chain_mut(&self) -> RwLockWriteGuard<'_, ChainIndex> {
        self.chain.write()
    }

    /// Read access to the committed coin set.
    pub fn coins(&self) -> RwLockReadGuard<'_, MemoryCoins> {
        self.coins.read()
    }

    /// Insert coins directly into the committed set (bootstrap and test
    /// fixtures).
    pub fn insert_coins(&self, txid: Hash256, coins: Coins) {
        self.coins.write().insert(txid, coins);
    }

    /// Hash of the active tip.
    pub fn tip_hash(&self) -> Option<Hash256> {
        self.chain.read().tip_hash()
    }

    /// Height of the active tip, -1 when empty.
    pub fn tip_height(&self) -> i32 {
        self.chain.read().height()
    }

    /// Accept a block extending the active tip.
    ///
    /// Performs proof-of-work and connection checks, commits the coin
    /// changes, and advances the chain index. Mempool eviction of the
    /// mined transactions is the caller's job.
    pub fn process_block(&self, block: &Block) -> StateResult<Hash256> {
        let mut chain = self.chain.write();
        let mut coins = self.coins.write();

        let header = &block.header;
        let hash = block.hash();

        if chain.tip_hash() != Some(header.hash_prev_block) {
            warn!(block = %hash, "block does not extend the active tip");
            return Err(StateError::NotExtendingTip {
                hash: hash.to_string(),
            });
        }
        let prev = chain.require_tip()?;
        let height = chain.entry(prev).height + 1;

        if block.merkle_root() != header.hash_merkle_root {
            return Err(StateError::InvalidBlock("merkle root mismatch".to_string()));
        }

        let algo = Algo::effective_for(header, header.algo());
        if !check_proof_of_work(&pow_hash(header, algo), header.bits) {
            return Err(StateError::BadProofOfWork(hash.to_string()));
        }
        if algo == Algo::Equihash {
            let eh = self.params.equihash();
            let mut state = initialise_state(&eh);
            state.update(&header.equihash_input());
            state.update(header.nonce256.as_bytes());
            if !is_valid_solution(&eh, &state, &header.solution) {
                return Err(StateError::BadProofOfWork(format!(
                    "{hash} has an invalid equihash solution"
                )));
            }
        }

        let fees = {
            let mut view = CoinsCache::new(&*coins);
            let fees = connect_block(block, &mut view, height, &self.params)?;
            let entries = view.into_entries();
            coins.absorb(entries);
            fees
        };

        chain.push(hash, header.version, header.time, header.bits);
        info!(
            height,
            block = %hash,
            txs = block.vtx.len(),
            fees,
            algo = algo.name(),
            "block accepted"
        );
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitmark_chain::{merkle_root, BlockHeader, OutPoint, Script, Transaction, TxIn, TxOut};

    fn genesis() -> Block {
        let coinbase = Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: Script::new().push_data(b"regtest genesis"),
                sequence: u32::MAX,
            }],
            vout: vec![TxOut::new(20 * bitmark_chain::COIN, Script::new())],
            lock_time: 0,
        };
        let mut header = BlockHeader {
            version: 2,
            time: 1_400_000_000,
            bits: 0x207f_ffff,
            ..Default::default()
        };
        let vtx = vec![coinbase];
        header.hash_merkle_root = merkle_root(&vtx.iter().map(|t| t.txid()).collect::<Vec<_>>());
        Block { header, vtx }
    }

    #[test]
    fn test_with_genesis_sets_tip_and_coins() {
        let genesis = genesis();
        let state = ChainState::with_genesis(ChainParams::regtest(), &genesis).unwrap();
        assert_eq!(state.tip_height(), 0);
        assert_eq!(state.tip_hash(), Some(genesis.hash()));
        assert_eq!(state.coins().len(), 1);
    }

    #[test]
    fn test_process_block_rejects_wrong_prev() {
        let genesis = genesis();
        let state = ChainState::with_genesis(ChainParams::regtest(), &genesis).unwrap();

        let mut block = genesis.clone();
        block.header.hash_prev_block = bitmark_chain::sha256d(b"elsewhere");
        assert!(matches!(
            state.process_block(&block),
            Err(StateError::NotExtendingTip { .. })
        ));
    }
}
