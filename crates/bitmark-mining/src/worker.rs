//! The per-worker mining loop.
//!
//! Each worker repeatedly snapshots the tip and mempool counter, builds a
//! template on a freshly reserved key, rolls the extra-nonce, and drives
//! the search. Between rounds it runs the periodic checks: hash metering,
//! cooperative interruption, peer presence, nonce-domain exhaustion,
//! mempool drift, tip changes, and the time/difficulty refresh.

use crate::buffers::format_hash_buffers;
use crate::coinbase::coinbase_script_for_key;
use crate::error::{MiningError, MiningResult};
use crate::miner::{check_work, MinerContext};
use crate::search::{
    classical_round, equihash_round, BestHash, RoundResult, SolutionAction, SolverSession,
};
use crate::template::BlockAssembler;
use crate::{NONCE_EXHAUSTED, TEMPLATE_REFRESH_SECS};
use bitmark_chain::{compact_to_target, hash_to_biguint, pow_hash, Algo, Block, NonceShape};
use bitmark_wallet::ReservedKey;
use num_bigint::BigUint;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Worker thread entry point.
pub(crate) fn mine(ctx: MinerContext, worker_id: usize) {
    info!(worker = worker_id, "miner thread started");
    match run(&ctx, worker_id) {
        Ok(()) => info!(worker = worker_id, "miner thread finished"),
        Err(MiningError::Interrupted) => {
            info!(worker = worker_id, "miner thread interrupted")
        }
        Err(err) => warn!(worker = worker_id, %err, "miner thread exiting"),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn run(ctx: &MinerContext, worker_id: usize) -> MiningResult<()> {
    let assembler = BlockAssembler::new(ctx.params.clone(), ctx.config.clone(), ctx.algo);
    let regtest = ctx.params.is_regtest();
    let mut reserved: Option<ReservedKey> = None;
    let mut templates_built = 0u64;

    loop {
        ctx.state.check_interrupt()?;

        if !regtest {
            // Mining against an offline chain is wasted work.
            while ctx.peers.is_empty() {
                std::thread::sleep(Duration::from_secs(1));
                ctx.state.check_interrupt()?;
            }
        } else if templates_built > 0 {
            // One-shot regression mining.
            return Ok(());
        }

        let tx_updated_last = ctx.mempool.transactions_updated();
        let (prev_index, prev_hash, prev_height) = {
            let chain = ctx.chain_state.chain();
            let tip = chain.require_tip()?;
            let entry = chain.entry(tip);
            (tip, entry.hash, entry.height)
        };

        if reserved.is_none() {
            reserved = Some(ctx.wallet.reserve_key()?);
        }
        let script = {
            let key = reserved.as_ref().expect("key reserved above");
            coinbase_script_for_key(&key.pubkey)
        };

        let mut template =
            assembler.create_new_block(&ctx.chain_state, &ctx.mempool, script, unix_now())?;
        templates_built += 1;
        ctx.state.record_template(&template);

        let extra_nonce = ctx
            .state
            .advance_extra_nonce(&mut template.block, prev_height);
        debug!(
            worker = worker_id,
            extra_nonce,
            txs = template.block.vtx.len(),
            "running miner on new template"
        );

        let mut buffers = format_hash_buffers(&template.block.header);
        let start_unix = unix_now();
        let mut target = compact_to_target(template.block.header.bits);
        let mut best = BestHash::default();
        let equihash = ctx.algo.nonce_shape() == NonceShape::Bits256WithSolution;

        'search: loop {
            let mut hashes_done = 0u64;

            if equihash {
                let eh = ctx.params.equihash();
                let input = template.block.header.equihash_input();
                let nonce = template.block.header.nonce256;
                let mut session = WorkerSession {
                    ctx,
                    block: &mut template.block,
                    target: &target,
                    reserved: &mut reserved,
                };
                if equihash_round(&eh, &input, &nonce, &mut session) == RoundResult::Found {
                    break 'search;
                }
            } else {
                match classical_round(
                    &mut template.block,
                    &target,
                    ctx.algo,
                    &mut best,
                    &mut hashes_done,
                ) {
                    RoundResult::Found => {
                        let key = reserved.as_ref().expect("key reserved above");
                        match check_work(ctx, &template.block, key) {
                            Ok(true) => reserved = None,
                            Ok(false) => {}
                            Err(err) => warn!(worker = worker_id, %err, "submission failed"),
                        }
                        break 'search;
                    }
                    RoundResult::Checkpoint => {
                        buffers.set_nonce(template.block.header.nonce);
                    }
                }
            }

            // Periodic checks.
            ctx.state.note_hashes(hashes_done, Instant::now(), regtest);
            ctx.state.check_interrupt()?;
            if !regtest && ctx.peers.is_empty() {
                break 'search;
            }
            if !equihash && template.block.header.nonce >= NONCE_EXHAUSTED {
                break 'search;
            }
            if ctx.mempool.transactions_updated() != tx_updated_last
                && unix_now().saturating_sub(start_unix) > TEMPLATE_REFRESH_SECS
            {
                break 'search;
            }
            if ctx.chain_state.tip_hash() != Some(prev_hash) {
                break 'search;
            }
            if equihash {
                template.block.header.nonce256.increment();
            }

            // Time refresh, and on min-difficulty networks the timestamp
            // can move the target with it.
            {
                let chain = ctx.chain_state.chain();
                chain.update_time(&mut template.block.header, prev_index, unix_now());
                buffers.set_time(template.block.header.time);
                if ctx.params.allow_min_difficulty {
                    template.block.header.bits = chain.next_work_required(
                        prev_index,
                        &ctx.params,
                        ctx.algo,
                        template.block.header.time as u64,
                    );
                    buffers.set_bits(template.block.header.bits);
                    target = compact_to_target(template.block.header.bits);
                }
            }
        }
    }
}

/// Equihash session: owns the candidate block for the duration of one
/// nonce's solver run.
struct WorkerSession<'a> {
    ctx: &'a MinerContext,
    block: &'a mut Block,
    target: &'a BigUint,
    reserved: &'a mut Option<ReservedKey>,
}

impl SolverSession for WorkerSession<'_> {
    fn on_solution(&mut self, minimal: &[u8]) -> SolutionAction {
        self.block.header.solution = minimal.to_vec();

        let hash = pow_hash(&self.block.header, Algo::Equihash);
        if hash_to_biguint(&hash) > *self.target {
            return SolutionAction::Continue;
        }

        let Some(key) = self.reserved.as_ref() else {
            return SolutionAction::Continue;
        };
        match check_work(self.ctx, self.block, key) {
            Ok(true) => {
                *self.reserved = None;
                // A mined block ends this template's search; on-demand
                // networks additionally end the worker via the one-shot
                // guard in the outer loop.
                SolutionAction::Stop
            }
            Ok(false) => SolutionAction::Continue,
            Err(err) => {
                warn!(%err, "equihash submission failed");
                SolutionAction::Stop
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.ctx.state.stop_requested()
    }
}
