//! Test harness for integration tests.
//!
//! Builds an in-memory node around a genesis chain state: funded coins,
//! a mempool, a wallet, a toggleable peer set, and helpers to assemble
//! and mine blocks.

use bitmark_chain::{
    check_proof_of_work, pow_hash, sha256d, Algo, Block, ChainParams, Hash256, Network, OutPoint,
    Script, Transaction, TxIn, TxOut,
};
use bitmark_mempool::Mempool;
use bitmark_mining::{
    AssemblerConfig, BlockAssembler, MinerContext, MinerState, StaticPeerSet,
};
use bitmark_state::{ChainState, Coins};
use bitmark_wallet::Wallet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed wall clock handed to template builds for determinism.
pub const TEST_NOW: u64 = 1_500_000_000;

/// An in-memory node fixture.
pub struct TestHarness {
    /// Chain parameters in use.
    pub params: ChainParams,
    /// Chain state seeded with the network genesis.
    pub state: Arc<ChainState>,
    /// Empty mempool.
    pub mempool: Arc<Mempool>,
    /// Wallet with an auto-refilling key pool.
    pub wallet: Arc<Wallet>,
    /// Peer set, connected by default.
    pub peers: Arc<StaticPeerSet>,
    /// Shared miner state.
    pub miner_state: Arc<MinerState>,
    seed: AtomicU64,
}

impl TestHarness {
    /// Create a fixture for `network`.
    pub fn new(network: Network) -> Self {
        let params = ChainParams::for_network(network);
        let genesis = params.genesis_block();
        let state =
            Arc::new(ChainState::with_genesis(params.clone(), &genesis).expect("genesis applies"));
        TestHarness {
            params,
            state,
            mempool: Arc::new(Mempool::new()),
            wallet: Arc::new(Wallet::new()),
            peers: Arc::new(StaticPeerSet::new(true)),
            miner_state: Arc::new(MinerState::new()),
            seed: AtomicU64::new(1),
        }
    }

    /// Regtest fixture.
    pub fn regtest() -> Self {
        Self::new(Network::Regtest)
    }

    fn next_seed(&self) -> u64 {
        self.seed.fetch_add(1, Ordering::SeqCst)
    }

    /// Append `count` synthetic headers with the given version word.
    pub fn extend_chain(&self, count: usize, version: i32) {
        let mut chain = self.state.chain_mut();
        for _ in 0..count {
            let seed = self.next_seed();
            let time = chain.tip().map(|t| t.time + 60).unwrap_or(TEST_NOW as u32);
            chain.push(
                sha256d(&seed.to_le_bytes()),
                version,
                time,
                self.params.pow_limit_bits,
            );
        }
    }

    /// Create a confirmed, spendable coin of `value` created at `height`.
    pub fn fund(&self, value: i64, height: i32) -> OutPoint {
        let seed = self.next_seed();
        let funding = Transaction {
            version: 1,
            vin: vec![TxIn::new(OutPoint::new(sha256d(&seed.to_le_bytes()), 0))],
            vout: vec![TxOut::new(value, Script::new())],
            lock_time: 0,
        };
        let txid = funding.txid();
        self.state.insert_coins(txid, Coins::from_tx(&funding, height));
        OutPoint::new(txid, 0)
    }

    /// A transaction spending `prevout` into a single output of `value`.
    pub fn spend(&self, prevout: OutPoint, value: i64) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn::new(prevout)],
            vout: vec![TxOut::new(value, Script::new())],
            lock_time: 0,
        }
    }

    /// Insert a transaction into the mempool.
    pub fn add_tx(&self, tx: Transaction, fee: i64) -> Hash256 {
        let height = self.state.tip_height();
        self.mempool
            .insert(tx, fee, height, TEST_NOW)
            .expect("mempool insert")
    }

    /// A miner context over this fixture.
    pub fn context(&self, algo: Algo, config: AssemblerConfig) -> MinerContext {
        let peers_concrete: Arc<StaticPeerSet> = Arc::clone(&self.peers);
        let peers: Arc<dyn bitmark_mining::PeerSet> = peers_concrete;
        MinerContext {
            params: self.params.clone(),
            chain_state: Arc::clone(&self.state),
            mempool: Arc::clone(&self.mempool),
            wallet: Arc::clone(&self.wallet),
            peers,
            state: Arc::clone(&self.miner_state),
            config,
            algo,
        }
    }

    /// An assembler over this fixture.
    pub fn assembler(&self, algo: Algo, config: AssemblerConfig) -> BlockAssembler {
        BlockAssembler::new(self.params.clone(), config, algo)
    }

    /// Assemble, solve (classical), and accept one block, advancing the
    /// tip. Only usable on networks with a trivial pow limit.
    pub fn mine_block(&self, algo: Algo) -> Block {
        let assembler = self.assembler(algo, AssemblerConfig::default());
        let key = self.wallet.reserve_key().expect("key available");
        let script = bitmark_mining::coinbase_script_for_key(&key.pubkey);
        let mut template = assembler
            .create_new_block(&self.state, &self.mempool, script, TEST_NOW)
            .expect("template builds");

        let prev_height = self.state.tip_height();
        self.miner_state
            .advance_extra_nonce(&mut template.block, prev_height);
        solve_classical(&mut template.block, algo);

        self.state.process_block(&template.block).expect("block accepted");
        self.mempool.remove_for_block(&template.block);
        self.wallet.keep_key(key.id);
        template.block
    }
}

/// Grind the 32-bit nonce until the header satisfies its own target.
pub fn solve_classical(block: &mut Block, algo: Algo) {
    let pow_algo = Algo::effective_for(&block.header, algo);
    loop {
        if check_proof_of_work(&pow_hash(&block.header, pow_algo), block.header.bits) {
            return;
        }
        block.header.nonce = block
            .header
            .nonce
            .checked_add(1)
            .expect("solution within the nonce domain");
    }
}
