//! Search drivers.
//!
//! Both drivers share one contract: run until a solution is handed to the
//! session, a checkpoint boundary is reached, or the session reports
//! cancellation. The worker loop owns the periodic checks between rounds.

use crate::solver::EquihashSolver;
use bitmark_chain::{
    hash_to_biguint, minimal_from_indices, pow_hash, Algo, Block, EquihashParams, Hash256,
};
use blake2b_simd::State as Blake2bState;
use num_bigint::BigUint;
use tracing::{debug, info};

/// What a session wants after seeing a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionAction {
    /// Keep searching the current nonce.
    Continue,
    /// Stop the driver; the block was handled.
    Stop,
}

/// Per-run callbacks for the Equihash driver.
///
/// Implementations own the candidate block: `on_solution` writes the
/// solution into the header, checks the target, and submits.
pub trait SolverSession {
    /// A minimal-encoded solution was produced.
    fn on_solution(&mut self, minimal: &[u8]) -> SolutionAction;

    /// Polled by the solver at round boundaries.
    fn is_cancelled(&self) -> bool;
}

/// Outcome of one driver round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundResult {
    /// A block satisfied the target; the search for this template is done.
    Found,
    /// The round ended at a checkpoint; run the periodic checks.
    Checkpoint,
}

/// Best-hash progress tracking for the classical inner loop.
#[derive(Debug, Default)]
pub struct BestHash(Option<Hash256>);

impl BestHash {
    /// Record `hash`; log when it improves on the best seen.
    fn observe(&mut self, hash: Hash256) {
        let improved = match &self.0 {
            Some(best) => hash < *best,
            None => true,
        };
        if improved {
            debug!(hash = %hash, "best hash");
            self.0 = Some(hash);
        }
    }
}

/// One round of the classical incrementing-nonce search.
///
/// Hashes until the target is met or the low byte of the nonce rolls over
/// to zero, the checkpoint boundary for the periodic checks. Headers with
/// base version <= 3 are hashed with Scrypt whatever `algo` says.
pub fn classical_round(
    block: &mut Block,
    target: &BigUint,
    algo: Algo,
    best: &mut BestHash,
    hashes_done: &mut u64,
) -> RoundResult {
    let pow_algo = Algo::effective_for(&block.header, algo);
    loop {
        let hash = pow_hash(&block.header, pow_algo);
        best.observe(hash);

        if hash_to_biguint(&hash) <= *target {
            info!(hash = %hash, nonce = block.header.nonce, "proof-of-work candidate");
            return RoundResult::Found;
        }
        block.header.nonce = block.header.nonce.wrapping_add(1);
        *hashes_done += 1;
        if block.header.nonce & 0xff == 0 {
            return RoundResult::Checkpoint;
        }
    }
}

/// One round of the Equihash search: solve the current 256-bit nonce.
///
/// `input` is the header image excluding nonce and solution; the caller
/// advances the nonce between rounds. Every raw solution is converted to
/// its minimal representation and offered to the session.
pub fn equihash_round(
    params: &EquihashParams,
    input: &[u8],
    nonce256: &Hash256,
    session: &mut dyn SolverSession,
) -> RoundResult {
    let mut state = bitmark_chain::initialise_state(params);
    state.update(input);
    let base_state: Blake2bState = state.clone();

    let mut current = base_state;
    current.update(nonce256.as_bytes());

    let mut solver = EquihashSolver::new(*params);
    solver.set_state(&current);
    if !solver.run(&*session) {
        return RoundResult::Checkpoint;
    }

    for indices in solver.solutions() {
        let minimal = minimal_from_indices(indices, params.index_bit_len());
        if session.on_solution(&minimal) == SolutionAction::Stop {
            return RoundResult::Found;
        }
    }
    RoundResult::Checkpoint
}
