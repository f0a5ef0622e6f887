//! Per-network chain parameters and engine constants.

use crate::block::{merkle_root, Block, BlockHeader};
use crate::equihash::EquihashParams;
use crate::pow::Algo;
use crate::script::Script;
use crate::transaction::{OutPoint, Transaction, TxIn, TxOut};

/// Smallest currency unit per coin.
pub const COIN: i64 = 100_000_000;

/// Maximum serialized block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 1_000_000;

/// Maximum signature operations per block.
pub const MAX_BLOCK_SIGOPS: u32 = (MAX_BLOCK_SIZE / 50) as u32;

/// Default `-blockmaxsize`.
pub const DEFAULT_BLOCK_MAX_SIZE: u32 = 750_000;

/// Default `-blockprioritysize`: bytes reserved for priority inclusion.
pub const DEFAULT_BLOCK_PRIORITY_SIZE: u32 = 50_000;

/// Default `-blockminsize`.
pub const DEFAULT_BLOCK_MIN_SIZE: u32 = 0;

/// Blocks before a coinbase output may be spent.
pub const COINBASE_MATURITY: i32 = 100;

/// Lock times below this are heights, above it timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Wire protocol version, recorded for serialization compatibility.
pub const PROTOCOL_VERSION: u32 = 70002;

/// Priority above which a transaction rides for free.
pub const FREE_TX_PRIORITY_THRESHOLD: f64 = COIN as f64 * 144.0 / 250.0;

/// Whether a transaction's priority qualifies it for free inclusion.
pub fn allow_free(priority: f64) -> bool {
    priority > FREE_TX_PRIORITY_THRESHOLD
}

/// Network flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Public test network.
    Testnet,
    /// Local regression-test network.
    Regtest,
}

/// Chain parameters for one network.
#[derive(Debug, Clone)]
pub struct ChainParams {
    /// Which network these parameters describe.
    pub network: Network,
    /// Height at which the multi-algorithm fork activates.
    pub fork_height: i32,
    /// Slow-start flag lookback window, in same-algorithm blocks.
    pub n_ssf: i32,
    /// Version-4 supermajority: blocks required out of the window.
    pub majority_required: u32,
    /// Version-4 supermajority: window length.
    pub majority_window: u32,
    /// Equihash n parameter.
    pub equihash_n: u32,
    /// Equihash k parameter.
    pub equihash_k: u32,
    /// Easiest allowed target, in compact form.
    pub pow_limit_bits: u32,
    /// Target spacing between blocks of any algorithm, in seconds.
    pub target_spacing: u64,
    /// Minimum relay fee per kilobyte.
    pub min_relay_fee: i64,
    /// Whether difficulty relaxes when blocks are late (test networks).
    pub allow_min_difficulty: bool,
    /// Whether a found block ends the search (regression tests).
    pub mine_blocks_on_demand: bool,
    /// Blocks between subsidy halvings.
    pub subsidy_halving_interval: i32,
    /// Initial block subsidy.
    pub initial_subsidy: i64,
}

impl ChainParams {
    /// Mainnet parameters.
    pub fn mainnet() -> Self {
        ChainParams {
            network: Network::Mainnet,
            fork_height: 480_000,
            n_ssf: 6,
            majority_required: 75,
            majority_window: 100,
            equihash_n: 200,
            equihash_k: 9,
            pow_limit_bits: 0x1e0f_ffff,
            target_spacing: 120,
            min_relay_fee: 1000,
            allow_min_difficulty: false,
            mine_blocks_on_demand: false,
            subsidy_halving_interval: 788_400,
            initial_subsidy: 20 * COIN,
        }
    }

    /// Testnet parameters.
    pub fn testnet() -> Self {
        ChainParams {
            network: Network::Testnet,
            fork_height: 2_000,
            majority_required: 51,
            equihash_n: 96,
            equihash_k: 5,
            pow_limit_bits: 0x1f07_ffff,
            allow_min_difficulty: true,
            ..Self::mainnet()
        }
    }

    /// Regression-test parameters: fork active from genesis, trivial
    /// difficulty, one-shot mining.
    pub fn regtest() -> Self {
        ChainParams {
            network: Network::Regtest,
            fork_height: 0,
            majority_required: 0,
            equihash_n: 48,
            equihash_k: 5,
            pow_limit_bits: 0x207f_ffff,
            allow_min_difficulty: true,
            mine_blocks_on_demand: true,
            subsidy_halving_interval: 150,
            ..Self::mainnet()
        }
    }

    /// Parameters for a network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Equihash parameters for this network.
    pub fn equihash(&self) -> EquihashParams {
        EquihashParams::new(self.equihash_n, self.equihash_k)
    }

    /// Per-algorithm block spacing: each algorithm contributes every
    /// `ALGO_COUNT`-th block on average.
    pub fn algo_spacing(&self) -> u64 {
        self.target_spacing * Algo::ALL.len() as u64
    }

    /// Coinbase value for a block at `height` collecting `fees`.
    pub fn block_value(&self, height: i32, fees: i64) -> i64 {
        let halvings = height / self.subsidy_halving_interval;
        let subsidy = if halvings >= 64 {
            0
        } else {
            self.initial_subsidy >> halvings
        };
        subsidy + fees
    }

    /// Whether this is the regression-test network.
    pub fn is_regtest(&self) -> bool {
        self.network == Network::Regtest
    }

    /// The network's genesis block.
    ///
    /// A fixed pre-fork block: version 2, minimum difficulty, an
    /// unspendable timestamped coinbase.
    pub fn genesis_block(&self) -> Block {
        let coinbase = Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint::null(),
                script_sig: Script::new()
                    .push_int(486_604_799)
                    .push_int(4)
                    .push_data(b"Bitmark genesis"),
                sequence: u32::MAX,
            }],
            vout: vec![TxOut::new(self.initial_subsidy, Script::new())],
            lock_time: 0,
        };
        let vtx = vec![coinbase];
        let header = BlockHeader {
            version: 2,
            hash_merkle_root: merkle_root(&vtx.iter().map(|t| t.txid()).collect::<Vec<_>>()),
            time: 1_394_000_000,
            bits: self.pow_limit_bits,
            ..Default::default()
        };
        Block { header, vtx }
    }
}

/// Flags appended to every coinbase scriptSig after the height and
/// extra-nonce.
pub fn coinbase_flags() -> Script {
    Script::new().push_data(b"/P2SH/")
}
