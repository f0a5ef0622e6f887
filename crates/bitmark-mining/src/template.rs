//! Block template construction.

use crate::coinbase::create_coinbase;
use crate::error::{MiningError, MiningResult};
use crate::queue::TxPriorityQueue;
use bitmark_chain::{
    allow_free, Algo, Block, ChainParams, Hash256, Script, DEFAULT_BLOCK_MAX_SIZE,
    DEFAULT_BLOCK_MIN_SIZE, DEFAULT_BLOCK_PRIORITY_SIZE, MAX_BLOCK_SIGOPS, MAX_BLOCK_SIZE,
};
use bitmark_mempool::Mempool;
use bitmark_state::{
    check_inputs, connect_block, p2sh_sigop_count, ChainState, CoinsCache, SCRIPT_VERIFY_P2SH,
};
use tracing::{debug, info};

/// Template builder configuration.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Largest block to create, clamped to `[1000, MAX_BLOCK_SIZE - 1000]`.
    pub max_size: u32,
    /// Bytes dedicated to high-priority transactions regardless of fee.
    pub priority_size: u32,
    /// Below this size, free transactions are accepted even in fee mode.
    pub min_size: u32,
    /// Emit a per-transaction diagnostic line for each inclusion.
    pub print_priority: bool,
    /// Dry-connect the finished template to catch builder bugs.
    pub check_template: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        AssemblerConfig {
            max_size: DEFAULT_BLOCK_MAX_SIZE,
            priority_size: DEFAULT_BLOCK_PRIORITY_SIZE,
            min_size: DEFAULT_BLOCK_MIN_SIZE,
            print_priority: false,
            check_template: true,
        }
    }
}

impl AssemblerConfig {
    /// Resolved limits after sanity clamping.
    pub fn clamped(&self) -> (u64, u64, u64) {
        let max_size = self.max_size.clamp(1000, (MAX_BLOCK_SIZE - 1000) as u32) as u64;
        let priority_size = (self.priority_size as u64).min(max_size);
        let min_size = (self.min_size as u64).min(max_size);
        (max_size, priority_size, min_size)
    }
}

/// A finished candidate block with its bookkeeping lists.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// The candidate block; header fields fixed except nonce/solution.
    pub block: Block,
    /// Per-transaction fees; slot 0 holds the negated aggregate.
    pub tx_fees: Vec<i64>,
    /// Per-transaction signature operation counts.
    pub tx_sigops: Vec<i64>,
    /// Serialized-size accounting at assembly time.
    pub block_size: u64,
    /// Number of non-coinbase transactions included.
    pub block_tx: u64,
}

/// Builds candidate blocks from the chain state and mempool.
pub struct BlockAssembler {
    params: ChainParams,
    config: AssemblerConfig,
    algo: Algo,
}

impl BlockAssembler {
    /// Create an assembler.
    pub fn new(params: ChainParams, config: AssemblerConfig, algo: Algo) -> Self {
        BlockAssembler {
            params,
            config,
            algo,
        }
    }

    /// The algorithm this assembler tags templates with.
    pub fn algo(&self) -> Algo {
        self.algo
    }

    /// Produce a candidate block paying `script_pubkey`.
    ///
    /// `now` is the wall clock in unix seconds; it feeds finality checks
    /// and the header timestamp.
    pub fn create_new_block(
        &self,
        state: &ChainState,
        mempool: &Mempool,
        script_pubkey: Script,
        now: u64,
    ) -> MiningResult<BlockTemplate> {
        // Chain and coins are read as a pair so the template sees one
        // consistent snapshot.
        let chain = state.chain();
        let coins = state.coins();
        let tip = chain.require_tip()?;
        let tip_entry = chain.entry(tip).clone();
        let height = tip_entry.height + 1;

        let mut block = Block::default();
        let fork_active = tip_entry.height >= self.params.fork_height - 1
            && chain.is_super_majority(
                4,
                tip,
                self.params.majority_required,
                self.params.majority_window,
            );
        if fork_active {
            block.header.set_algo(self.algo);
        }

        block.vtx.push(create_coinbase(script_pubkey));
        let mut tx_fees: Vec<i64> = vec![-1];
        let mut tx_sigops: Vec<i64> = vec![-1];

        let (max_size, priority_size, min_size) = self.config.clamped();

        let mut view = CoinsCache::new(&*coins);
        let mut sorted_by_fee = priority_size == 0;
        let mut queue =
            TxPriorityQueue::build(mempool, &mut view, tip_entry.height, now, sorted_by_fee);

        let mut block_size: u64 = 1000;
        let mut block_sigops: i64 = 100;
        let mut block_tx: u64 = 0;
        let mut fees: i64 = 0;

        while let Some(candidate) = queue.pop() {
            let tx = &candidate.tx;
            let tx_size = tx.serialized_size() as u64;
            if block_size + tx_size >= max_size {
                continue;
            }

            let legacy_sigops = tx.legacy_sigop_count() as i64;
            if block_sigops + legacy_sigops >= MAX_BLOCK_SIGOPS as i64 {
                continue;
            }

            // Free transactions stop once the block has its minimum size.
            if sorted_by_fee
                && candidate.fee_per_kb < self.params.min_relay_fee as f64
                && block_size + tx_size >= min_size
            {
                continue;
            }

            // One-shot transition to fee ordering once the priority region
            // is spent or priorities stop qualifying as free.
            if !sorted_by_fee
                && (block_size + tx_size >= priority_size || !allow_free(candidate.priority))
            {
                sorted_by_fee = true;
                queue.set_order(true);
            }

            if !view.have_inputs(tx) {
                continue;
            }
            let tx_fee = view.value_in(tx) - tx.value_out();

            let total_sigops = legacy_sigops + p2sh_sigop_count(tx, &mut view) as i64;
            if block_sigops + total_sigops >= MAX_BLOCK_SIGOPS as i64 {
                continue;
            }

            if let Err(err) = check_inputs(tx, &mut view, height, SCRIPT_VERIFY_P2SH) {
                debug!(tx = %candidate.txid, %err, "skipping transaction");
                continue;
            }

            view.apply_transaction(tx, height, &candidate.txid)?;

            block.vtx.push((**tx).clone());
            tx_fees.push(tx_fee);
            tx_sigops.push(total_sigops);
            block_size += tx_size;
            block_sigops += total_sigops;
            block_tx += 1;
            fees += tx_fee;

            if self.config.print_priority {
                info!(
                    priority = format!("{:.1}", candidate.priority),
                    fee_per_kb = format!("{:.1}", candidate.fee_per_kb),
                    tx = %candidate.txid,
                    "included transaction"
                );
            }

            queue.release_dependents(&candidate.txid);
        }

        info!(size = block_size, txs = block_tx, "assembled block template");

        if fork_active {
            self.decide_update_ssf(&chain, tip, &mut block);
        }

        tx_fees[0] = -fees;

        block.header.hash_prev_block = tip_entry.hash;
        chain.update_time(&mut block.header, tip, now);
        block.header.bits =
            chain.next_work_required(tip, &self.params, self.algo, block.header.time as u64);
        block.header.nonce = 0;
        if self.algo == Algo::Equihash {
            block.header.nonce256 = Hash256::ZERO;
            block.header.solution.clear();
        }
        tx_sigops[0] = block.vtx[0].legacy_sigop_count() as i64;
        block.vtx[0].vout[0].value = self.params.block_value(height, fees);

        if self.config.check_template {
            let mut check_view = CoinsCache::new(&*coins);
            connect_block(&block, &mut check_view, height, &self.params)
                .map_err(|err| MiningError::TemplateFailed(err.to_string()))?;
        }

        Ok(BlockTemplate {
            block,
            tx_fees,
            tx_sigops,
            block_size,
            block_tx,
        })
    }

    /// Slow-start flag: walk back through blocks of this algorithm; set
    /// the flag unless an update marker appears inside the window before
    /// its oldest position.
    fn decide_update_ssf(
        &self,
        chain: &bitmark_state::ChainIndex,
        tip: usize,
        block: &mut Block,
    ) {
        let start = if chain.entry(tip).algo() == self.algo {
            Some(tip)
        } else {
            chain.pprev_algo(tip, self.algo)
        };
        let Some(mut cursor) = start else {
            debug!(algo = self.algo.name(), "no prior block of algo, slow-start update set");
            block.header.set_update_ssf();
            return;
        };

        let mut update = true;
        for i in 0..self.params.n_ssf {
            if chain.entry(cursor).update_ssf() {
                debug!(distance = i, "slow-start update marker found");
                if i != self.params.n_ssf - 1 {
                    update = false;
                }
                break;
            }
            match chain.pprev_algo(cursor, self.algo) {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
        if update {
            block.header.set_update_ssf();
        }
    }
}
