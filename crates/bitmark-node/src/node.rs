//! Node assembly.

use crate::config::NodeConfig;
use anyhow::{bail, Result};
use bitmark_chain::{Algo, ChainParams, Network};
use bitmark_mempool::Mempool;
use bitmark_mining::{AssemblerConfig, Miner, MinerContext, MinerState, StaticPeerSet};
use bitmark_state::ChainState;
use bitmark_wallet::Wallet;
use std::sync::Arc;
use tracing::info;

/// A running node: chain state, mempool, wallet, and the miner.
pub struct Node {
    config: NodeConfig,
    miner: Miner,
}

impl Node {
    /// Assemble a node from configuration.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let network = match config.network.as_str() {
            "mainnet" => Network::Mainnet,
            "testnet" => Network::Testnet,
            "regtest" => Network::Regtest,
            other => bail!("unknown network {other:?}"),
        };
        let params = ChainParams::for_network(network);

        let Some(algo) = Algo::from_name(&config.mining.algo) else {
            bail!("unknown mining algorithm {:?}", config.mining.algo);
        };

        let genesis = params.genesis_block();
        let chain_state = Arc::new(ChainState::with_genesis(params.clone(), &genesis)?);
        info!(genesis = %genesis.hash(), network = ?network, "chain initialized");

        let assembler_config = AssemblerConfig {
            max_size: config.mining.block_max_size,
            priority_size: config.mining.block_priority_size,
            min_size: config.mining.block_min_size,
            print_priority: config.mining.print_priority,
            check_template: true,
        };

        // The peer layer is wired in separately; regtest flies solo, so
        // its workers never wait on connectivity.
        let peers: Arc<dyn bitmark_mining::PeerSet> =
            Arc::new(StaticPeerSet::new(params.is_regtest()));

        let ctx = MinerContext {
            params,
            chain_state,
            mempool: Arc::new(Mempool::new()),
            wallet: Arc::new(Wallet::new()),
            peers,
            state: Arc::new(MinerState::new()),
            config: assembler_config,
            algo,
        };

        Ok(Node {
            config,
            miner: Miner::new(ctx),
        })
    }

    /// The miner supervisor.
    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    /// Start mining according to the configuration.
    pub fn start_mining(&self) {
        self.miner
            .generate(self.config.mining.generate, self.config.mining.threads);
    }

    /// Stop mining.
    pub fn stop_mining(&self) {
        self.miner.stop();
    }

    /// Current chain height.
    pub fn height(&self) -> i32 {
        self.miner.ctx().chain_state.tip_height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regtest_config(algo: &str) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.network = "regtest".to_string();
        config.mining.algo = algo.to_string();
        config
    }

    #[test]
    fn test_node_assembles_on_regtest() {
        let node = Node::new(regtest_config("sha256d")).unwrap();
        assert_eq!(node.height(), 0);
        assert!(!node.miner().is_running());
    }

    #[test]
    fn test_node_rejects_unknown_algo() {
        assert!(Node::new(regtest_config("x11")).is_err());
    }

    #[test]
    fn test_node_rejects_unknown_network() {
        let mut config = NodeConfig::default();
        config.network = "simnet".to_string();
        assert!(Node::new(config).is_err());
    }

    #[test]
    fn test_regtest_one_shot_mining() {
        let config = {
            let mut c = regtest_config("sha256d");
            c.mining.generate = true;
            c.mining.threads = 1;
            c
        };
        let node = Node::new(config).unwrap();
        node.start_mining();
        // Regtest difficulty is trivial; the single worker mines one
        // block and exits on its own.
        node.miner().join();
        assert_eq!(node.height(), 1);
    }
}
