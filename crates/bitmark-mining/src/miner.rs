//! Miner supervisor: worker lifecycle, shared miner state, hash metering,
//! and block submission.

use crate::coinbase::{increment_extra_nonce, ExtraNonce};
use crate::error::{MiningError, MiningResult};
use crate::template::{AssemblerConfig, BlockTemplate};
use crate::traits::PeerSet;
use crate::worker;
use bitmark_chain::{compact_to_target, hash_to_biguint, pow_hash, Algo, Block, ChainParams, COIN};
use bitmark_mempool::Mempool;
use bitmark_state::{ChainState, StateError};
use bitmark_wallet::{ReservedKey, Wallet};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Hash meter window length.
const METER_WINDOW: Duration = Duration::from_secs(4);

/// Minimum interval between hash-rate log lines.
const METER_LOG_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Sliding-window hash-rate meter.
#[derive(Debug, Default)]
pub struct HashMeter {
    window_start: Option<Instant>,
    counter: u64,
    rate: f64,
    last_log: Option<Instant>,
}

impl HashMeter {
    /// Fold in `hashes` completed by `now`; recompute the rate once the
    /// window has elapsed. `quiet` suppresses the periodic log line.
    pub fn note(&mut self, hashes: u64, now: Instant, quiet: bool) {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            self.counter = 0;
            return;
        };
        self.counter += hashes;
        let elapsed = now.duration_since(start);
        if elapsed <= METER_WINDOW {
            return;
        }
        self.rate = 1000.0 * self.counter as f64 / elapsed.as_millis().max(1) as f64;
        self.window_start = Some(now);
        self.counter = 0;

        let log_due = self
            .last_log
            .map(|at| now.duration_since(at) > METER_LOG_INTERVAL)
            .unwrap_or(true);
        if log_due && !quiet {
            self.last_log = Some(now);
            info!(khash_per_sec = format!("{:.0}", self.rate / 1000.0), "hashmeter");
        }
    }

    /// Last computed rate in hashes per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Supervisor-owned shared miner state.
///
/// Everything the workers share lives here: the cooperative interrupt
/// flag, last-template statistics, the hash meter behind its own lock,
/// and the process-wide extra-nonce pair.
#[derive(Debug, Default)]
pub struct MinerState {
    interrupt: AtomicBool,
    /// Transactions in the most recent template.
    pub last_block_tx: AtomicU64,
    /// Serialized size of the most recent template.
    pub last_block_size: AtomicU64,
    meter: Mutex<HashMeter>,
    extra_nonce: Mutex<ExtraNonce>,
}

impl MinerState {
    /// Create fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every worker to unwind at its next checkpoint.
    pub fn request_stop(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Re-arm after a stop, before spawning a new worker group.
    pub fn clear_stop(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn stop_requested(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Cooperative interruption probe.
    pub fn check_interrupt(&self) -> MiningResult<()> {
        if self.stop_requested() {
            Err(MiningError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Meter `hashes` completed by `now`.
    pub fn note_hashes(&self, hashes: u64, now: Instant, quiet: bool) {
        self.meter.lock().note(hashes, now, quiet);
    }

    /// Current hash rate estimate.
    pub fn hashes_per_sec(&self) -> f64 {
        self.meter.lock().rate()
    }

    /// Advance the shared extra-nonce for a template.
    pub fn advance_extra_nonce(&self, block: &mut Block, prev_height: i32) -> u32 {
        increment_extra_nonce(block, prev_height, &mut self.extra_nonce.lock())
    }

    /// Record statistics of a freshly built template.
    pub fn record_template(&self, template: &BlockTemplate) {
        self.last_block_tx.store(template.block_tx, Ordering::Relaxed);
        self.last_block_size
            .store(template.block_size, Ordering::Relaxed);
    }
}

/// Everything a worker needs, shared by the supervisor.
#[derive(Clone)]
pub struct MinerContext {
    /// Chain parameters.
    pub params: ChainParams,
    /// Chain state (index + coins + validation).
    pub chain_state: Arc<ChainState>,
    /// The mempool.
    pub mempool: Arc<Mempool>,
    /// Key reservation service.
    pub wallet: Arc<Wallet>,
    /// Peer set view.
    pub peers: Arc<dyn PeerSet>,
    /// Shared miner state.
    pub state: Arc<MinerState>,
    /// Template builder configuration.
    pub config: AssemblerConfig,
    /// Mining algorithm.
    pub algo: Algo,
}

/// Submit a solved block.
///
/// Verifies the proof of work against the header target, refuses stale
/// work without touching the validator, commits the reserved key, and
/// hands the block to block processing. Returns `Ok(false)` when the hash
/// does not meet the target.
pub fn check_work(
    ctx: &MinerContext,
    block: &Block,
    reserved: &ReservedKey,
) -> MiningResult<bool> {
    let header = &block.header;
    let pow_algo = Algo::effective_for(header, ctx.algo);
    let hash = pow_hash(header, pow_algo);
    let target = compact_to_target(header.bits);
    if hash_to_biguint(&hash) > target {
        return Ok(false);
    }

    info!(
        hash = %hash,
        bits = format!("{:#x}", header.bits),
        "proof-of-work found"
    );
    info!(
        generated = format_money(block.vtx[0].vout[0].value),
        "coinbase value"
    );

    if ctx.chain_state.tip_hash() != Some(header.hash_prev_block) {
        warn!(block = %block.hash(), "generated block is stale");
        return Err(MiningError::Stale);
    }

    ctx.wallet.keep_key(reserved.id);
    ctx.wallet.mark_request_zero(block.hash());

    match ctx.chain_state.process_block(block) {
        Ok(_) => {
            ctx.mempool.remove_for_block(block);
            Ok(true)
        }
        Err(StateError::NotExtendingTip { .. }) => Err(MiningError::Stale),
        Err(err) => Err(MiningError::Rejected(err.to_string())),
    }
}

fn format_money(value: i64) -> String {
    format!("{}.{:08}", value / COIN, (value % COIN).unsigned_abs())
}

/// The miner supervisor.
pub struct Miner {
    ctx: MinerContext,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Miner {
    /// Create a supervisor.
    pub fn new(ctx: MinerContext) -> Self {
        Miner {
            ctx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Shared context.
    pub fn ctx(&self) -> &MinerContext {
        &self.ctx
    }

    /// Start or stop mining.
    ///
    /// Any previous worker group is interrupted and joined first. With
    /// `generate` false or zero threads, no workers run. Negative thread
    /// counts select hardware concurrency, or one thread on the
    /// regression network.
    pub fn generate(&self, generate: bool, threads: i32) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            self.ctx.state.request_stop();
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }

        if !generate || threads == 0 {
            info!("miner stopped");
            return;
        }

        let threads = if threads < 0 {
            if self.ctx.params.is_regtest() {
                1
            } else {
                num_cpus::get() as i32
            }
        } else {
            threads
        };

        self.ctx.state.clear_stop();
        for i in 0..threads {
            let ctx = self.ctx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("bitmark-miner-{i}"))
                .spawn(move || worker::mine(ctx, i as usize))
                .expect("spawn miner thread");
            workers.push(handle);
        }
        info!(threads, algo = self.ctx.algo.name(), "miner started");
    }

    /// Interrupt and join all workers.
    pub fn stop(&self) {
        self.generate(false, 0);
    }

    /// Block until the current worker group exits on its own.
    pub fn join(&self) {
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Whether a worker group is attached.
    pub fn is_running(&self) -> bool {
        !self.workers.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_reports_windowed_rate() {
        let mut meter = HashMeter::default();
        let t0 = Instant::now();
        meter.note(0, t0, true);

        let hashes = 40_000u64;
        meter.note(hashes, t0 + Duration::from_millis(4005), true);

        let rate = meter.rate();
        assert!(rate >= hashes as f64 / 4.01, "rate {rate} too low");
        assert!(rate <= hashes as f64 / 3.99, "rate {rate} too high");
    }

    #[test]
    fn test_meter_accumulates_within_window() {
        let mut meter = HashMeter::default();
        let t0 = Instant::now();
        meter.note(0, t0, true);
        meter.note(10_000, t0 + Duration::from_secs(1), true);
        meter.note(10_000, t0 + Duration::from_secs(2), true);
        assert_eq!(meter.rate(), 0.0);

        meter.note(20_000, t0 + Duration::from_millis(4100), true);
        assert!(meter.rate() > 0.0);
    }

    #[test]
    fn test_interrupt_flag() {
        let state = MinerState::new();
        assert!(state.check_interrupt().is_ok());
        state.request_stop();
        assert!(matches!(
            state.check_interrupt(),
            Err(MiningError::Interrupted)
        ));
        state.clear_stop();
        assert!(state.check_interrupt().is_ok());
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(20 * COIN), "20.00000000");
        assert_eq!(format_money(COIN + 5), "1.00000005");
    }
}
