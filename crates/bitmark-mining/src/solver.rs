//! Equihash solver.
//!
//! Wagner's algorithm over bucketed digit rounds: `digit0` expands the
//! index space into hash strings, each following round pairs entries that
//! collide on the current digit, and `digit_k` keeps pairs whose final two
//! digits cancel completely. Buckets are capped; the overflow counter
//! records dropped entries and is reset between rounds.

use crate::search::SolverSession;
use bitmark_chain::{hash_digits, EquihashParams};
use blake2b_simd::State as Blake2bState;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Expected entries per bucket, times this factor, caps a bucket.
const BUCKET_SLACK: usize = 4;

/// Maximum solutions retained per run.
const MAX_SOLUTIONS: usize = 8;

#[derive(Debug, Clone)]
struct Slot {
    /// XOR-accumulated digits still to cancel, current digit first.
    digits: Vec<u32>,
    /// Leaf indices of the subtree, ordered by the join rule.
    indices: Vec<u32>,
}

/// One solver run over a seeded Blake2b state.
pub struct EquihashSolver {
    params: EquihashParams,
    state: Option<Blake2bState>,
    slots: Vec<Slot>,
    /// Entries dropped by bucket caps in the current round.
    pub bucket_overflows: u64,
    solutions: Vec<Vec<u32>>,
}

impl EquihashSolver {
    /// Create a solver for the given parameters.
    pub fn new(params: EquihashParams) -> Self {
        EquihashSolver {
            params,
            state: None,
            slots: Vec::new(),
            bucket_overflows: 0,
            solutions: Vec::new(),
        }
    }

    /// Seed with a Blake2b state that has absorbed the header and nonce.
    pub fn set_state(&mut self, state: &Blake2bState) {
        self.state = Some(state.clone());
        self.slots.clear();
        self.solutions.clear();
        self.bucket_overflows = 0;
    }

    /// Round 0: generate the hash string for every index.
    pub fn digit0(&mut self) {
        let state = self.state.as_ref().expect("state seeded before digit0");
        let count = self.params.index_count();
        self.slots = Vec::with_capacity(count as usize);
        for index in 0..count {
            self.slots.push(Slot {
                digits: hash_digits(&self.params, state, index),
                indices: vec![index],
            });
        }
        trace!(slots = self.slots.len(), "digit0 generated");
    }

    /// An even-numbered collision round.
    pub fn digit_even(&mut self, round: u32) {
        debug_assert!(round % 2 == 0);
        self.collide(round);
    }

    /// An odd-numbered collision round.
    pub fn digit_odd(&mut self, round: u32) {
        debug_assert!(round % 2 == 1);
        self.collide(round);
    }

    /// Final round: the two remaining digits must cancel together.
    pub fn digit_k(&mut self) {
        let slots = std::mem::take(&mut self.slots);
        let buckets = bucket_by_first_digit(&self.params, slots, &mut self.bucket_overflows);
        for bucket in buckets {
            for i in 0..bucket.len() {
                for j in i + 1..bucket.len() {
                    if self.solutions.len() >= MAX_SOLUTIONS {
                        return;
                    }
                    let (a, b) = (&bucket[i], &bucket[j]);
                    // Both remaining digits must cancel, not just the
                    // bucketed one.
                    if a.digits != b.digits {
                        continue;
                    }
                    if let Some(indices) = join_indices(a, b) {
                        if distinct(&indices) {
                            self.solutions.push(indices);
                        }
                    }
                }
            }
        }
        debug!(solutions = self.solutions.len(), "digitK complete");
    }

    /// Reset the per-round overflow counter.
    pub fn reset_overflow(&mut self) {
        self.bucket_overflows = 0;
    }

    /// Raw index solutions found by the last run.
    pub fn solutions(&self) -> &[Vec<u32>] {
        &self.solutions
    }

    /// Run the full digit schedule, polling the session for cancellation
    /// at every round boundary. Returns false when cancelled.
    pub fn run(&mut self, session: &dyn SolverSession) -> bool {
        self.digit0();
        if session.is_cancelled() {
            return false;
        }
        for round in 1..self.params.k {
            if round % 2 == 1 {
                self.digit_odd(round);
            } else {
                self.digit_even(round);
            }
            if self.bucket_overflows > 0 {
                debug!(round, dropped = self.bucket_overflows, "bucket overflow");
            }
            self.reset_overflow();
            if session.is_cancelled() {
                return false;
            }
        }
        self.digit_k();
        true
    }

    /// Pair entries colliding on the current digit and XOR them together.
    fn collide(&mut self, round: u32) {
        let slots = std::mem::take(&mut self.slots);
        let before = slots.len();
        let buckets = bucket_by_first_digit(&self.params, slots, &mut self.bucket_overflows);

        let mut next = Vec::with_capacity(before);
        for bucket in buckets {
            for i in 0..bucket.len() {
                for j in i + 1..bucket.len() {
                    let (a, b) = (&bucket[i], &bucket[j]);
                    // Identical leading leaves mean a degenerate pair.
                    if a.indices[0] == b.indices[0] {
                        continue;
                    }
                    let Some(indices) = join_indices(a, b) else {
                        continue;
                    };
                    let digits: Vec<u32> = a.digits[1..]
                        .iter()
                        .zip(b.digits[1..].iter())
                        .map(|(x, y)| x ^ y)
                        .collect();
                    next.push(Slot { digits, indices });
                }
            }
        }
        trace!(round, before, after = next.len(), "collision round");
        self.slots = next;
    }
}

/// Group slots into buckets keyed on their first remaining digit.
fn bucket_by_first_digit(
    params: &EquihashParams,
    slots: Vec<Slot>,
    overflows: &mut u64,
) -> Vec<Vec<Slot>> {
    let bucket_count = 1usize << params.digit_bits();
    let expected = (slots.len() / bucket_count.max(1)).max(1);
    let cap = expected * BUCKET_SLACK + 4;

    let mut buckets: Vec<Vec<Slot>> = vec![Vec::new(); bucket_count];
    for slot in slots {
        let key = slot.digits[0] as usize;
        let bucket = &mut buckets[key];
        if bucket.len() >= cap {
            *overflows += 1;
            continue;
        }
        bucket.push(slot);
    }
    buckets
}

/// Join two subtrees, smaller leading leaf index first. `None` when the
/// subtrees share their leading leaf.
fn join_indices(a: &Slot, b: &Slot) -> Option<Vec<u32>> {
    if a.indices[0] == b.indices[0] {
        return None;
    }
    let (first, second) = if a.indices[0] < b.indices[0] {
        (a, b)
    } else {
        (b, a)
    };
    let mut out = Vec::with_capacity(first.indices.len() * 2);
    out.extend_from_slice(&first.indices);
    out.extend_from_slice(&second.indices);
    Some(out)
}

fn distinct(indices: &[u32]) -> bool {
    let mut seen = HashSet::with_capacity(indices.len());
    indices.iter().all(|i| seen.insert(*i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SolutionAction;
    use bitmark_chain::{initialise_state, is_valid_solution, minimal_from_indices, Hash256};

    struct NeverCancelled;
    impl SolverSession for NeverCancelled {
        fn on_solution(&mut self, _minimal: &[u8]) -> SolutionAction {
            SolutionAction::Continue
        }
        fn is_cancelled(&self) -> bool {
            false
        }
    }

    struct AlwaysCancelled;
    impl SolverSession for AlwaysCancelled {
        fn on_solution(&mut self, _minimal: &[u8]) -> SolutionAction {
            SolutionAction::Continue
        }
        fn is_cancelled(&self) -> bool {
            true
        }
    }

    fn seeded_state(params: &EquihashParams, seed: &[u8]) -> Blake2bState {
        let mut state = initialise_state(params);
        state.update(seed);
        state.update(Hash256::ZERO.as_bytes());
        state
    }

    #[test]
    fn test_solver_finds_valid_solutions_small_params() {
        let params = EquihashParams::new(48, 5);
        let state = seeded_state(&params, b"solver test header");

        let mut solver = EquihashSolver::new(params);
        solver.set_state(&state);
        assert!(solver.run(&NeverCancelled));

        // (48, 5) has a couple of solutions per nonce on average; accept
        // the occasional empty run but validate every solution found.
        for indices in solver.solutions() {
            assert_eq!(indices.len(), params.proof_size());
            let minimal = minimal_from_indices(indices, params.index_bit_len());
            assert!(
                is_valid_solution(&params, &state, &minimal),
                "solver produced an invalid solution"
            );
        }
    }

    #[test]
    fn test_solver_finds_solution_across_nonces() {
        // Scanning a few nonces makes a hit effectively certain.
        let params = EquihashParams::new(48, 5);
        let mut found = 0;
        for nonce in 0u8..6 {
            let mut state = initialise_state(&params);
            state.update(b"nonce scan header");
            let mut nonce256 = [0u8; 32];
            nonce256[0] = nonce;
            state.update(&nonce256);

            let mut solver = EquihashSolver::new(params);
            solver.set_state(&state);
            solver.run(&NeverCancelled);
            for indices in solver.solutions() {
                let minimal = minimal_from_indices(indices, params.index_bit_len());
                assert!(is_valid_solution(&params, &state, &minimal));
                found += 1;
            }
        }
        assert!(found > 0, "no solution across six nonces");
    }

    #[test]
    fn test_solver_deterministic() {
        let params = EquihashParams::new(48, 5);
        let state = seeded_state(&params, b"determinism");

        let mut a = EquihashSolver::new(params);
        a.set_state(&state);
        a.run(&NeverCancelled);

        let mut b = EquihashSolver::new(params);
        b.set_state(&state);
        b.run(&NeverCancelled);

        assert_eq!(a.solutions(), b.solutions());
    }

    #[test]
    fn test_cancellation_stops_run() {
        let params = EquihashParams::new(48, 5);
        let state = seeded_state(&params, b"cancelled");
        let mut solver = EquihashSolver::new(params);
        solver.set_state(&state);
        assert!(!solver.run(&AlwaysCancelled));
        assert!(solver.solutions().is_empty());
    }

    #[test]
    fn test_ordering_of_solution_indices() {
        let params = EquihashParams::new(48, 5);
        let state = seeded_state(&params, b"ordering");
        let mut solver = EquihashSolver::new(params);
        solver.set_state(&state);
        solver.run(&NeverCancelled);
        for indices in solver.solutions() {
            // The join rule keeps the first leaf of the left subtree the
            // minimum of every pair at the top split.
            assert!(indices[0] < indices[indices.len() / 2]);
        }
    }
}
