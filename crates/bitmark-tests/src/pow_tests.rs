//! Proof-of-work round trips.

use crate::harness::{TestHarness, TEST_NOW};
use bitmark_chain::{
    compact_to_target, hash_to_biguint, indices_from_minimal, initialise_state,
    is_valid_solution, minimal_from_indices, pow_hash, Algo, BlockHeader, EquihashParams,
    Hash256,
};
use bitmark_mining::{check_work, AssemblerConfig, EquihashSolver, SolutionAction, SolverSession};

struct NoCancel;
impl SolverSession for NoCancel {
    fn on_solution(&mut self, _minimal: &[u8]) -> SolutionAction {
        SolutionAction::Continue
    }
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Scan nonces from zero until the solver yields a solution.
fn first_solution(
    params: &EquihashParams,
    input: &[u8],
    max_nonces: u32,
) -> Option<(Hash256, Vec<u8>)> {
    let mut nonce = Hash256::ZERO;
    for _ in 0..max_nonces {
        let mut state = initialise_state(params);
        state.update(input);
        state.update(nonce.as_bytes());

        let mut solver = EquihashSolver::new(*params);
        solver.set_state(&state);
        solver.run(&NoCancel);
        if let Some(indices) = solver.solutions().first() {
            let minimal = minimal_from_indices(indices, params.index_bit_len());
            return Some((nonce, minimal));
        }
        nonce.increment();
    }
    None
}

fn seeded_header() -> BlockHeader {
    let mut header = BlockHeader {
        time: 1_500_000_000,
        bits: 0x2007_ffff,
        ..Default::default()
    };
    header.set_algo(Algo::Equihash);
    header.hash_prev_block = bitmark_chain::sha256d(b"equihash parent");
    header.hash_merkle_root = bitmark_chain::sha256d(b"equihash txs");
    header
}

#[test]
fn test_equihash_96_5_solution_round_trip() {
    let params = EquihashParams::new(96, 5);
    let header = seeded_header();
    let input = header.equihash_input();

    let (nonce, minimal) =
        first_solution(&params, &input, 8).expect("a solution within eight nonces");

    // The solver's output satisfies the validator.
    let mut state = initialise_state(&params);
    state.update(&input);
    state.update(nonce.as_bytes());
    assert!(is_valid_solution(&params, &state, &minimal));

    // Inserting the solution into the header gives a reproducible hash.
    let mut solved = header.clone();
    solved.nonce256 = nonce;
    solved.solution = minimal.clone();
    let first_hash = pow_hash(&solved, Algo::Equihash);

    // The whole procedure repeats bit-for-bit.
    let (nonce2, minimal2) =
        first_solution(&params, &input, 8).expect("same scan finds the same solution");
    assert_eq!(nonce2, nonce);
    assert_eq!(minimal2, minimal);

    let mut solved2 = header.clone();
    solved2.nonce256 = nonce2;
    solved2.solution = minimal2;
    assert_eq!(pow_hash(&solved2, Algo::Equihash), first_hash);
}

#[test]
fn test_equihash_block_mined_and_accepted() {
    let harness = TestHarness::regtest();
    let ctx = harness.context(Algo::Equihash, AssemblerConfig::default());
    let params = harness.params.equihash();

    let key = harness.wallet.reserve_key().unwrap();
    let script = bitmark_mining::coinbase_script_for_key(&key.pubkey);
    let assembler = harness.assembler(Algo::Equihash, AssemblerConfig::default());
    let mut template = assembler
        .create_new_block(&harness.state, &harness.mempool, script, TEST_NOW)
        .unwrap();
    harness
        .miner_state
        .advance_extra_nonce(&mut template.block, 0);

    let target = compact_to_target(template.block.header.bits);
    let input = template.block.header.equihash_input();

    let mut accepted = false;
    'nonces: for _ in 0..64 {
        let mut state = initialise_state(&params);
        state.update(&input);
        state.update(template.block.header.nonce256.as_bytes());

        let mut solver = EquihashSolver::new(params);
        solver.set_state(&state);
        solver.run(&NoCancel);
        for indices in solver.solutions() {
            template.block.header.solution =
                minimal_from_indices(indices, params.index_bit_len());
            let hash = pow_hash(&template.block.header, Algo::Equihash);
            if hash_to_biguint(&hash) <= target {
                assert!(check_work(&ctx, &template.block, &key).unwrap());
                accepted = true;
                break 'nonces;
            }
        }
        template.block.header.nonce256.increment();
    }

    assert!(accepted, "no acceptable solution across 64 nonces");
    assert_eq!(harness.state.tip_height(), 1);
    assert_eq!(harness.state.tip_hash(), Some(template.block.hash()));
}

#[test]
fn test_equihash_solution_indices_survive_minimal_encoding() {
    let params = EquihashParams::new(96, 5);
    let header = seeded_header();
    let input = header.equihash_input();

    let (nonce, minimal) =
        first_solution(&params, &input, 8).expect("a solution within eight nonces");
    let indices = indices_from_minimal(&minimal, params.index_bit_len()).unwrap();
    assert_eq!(indices.len(), params.proof_size());
    assert_eq!(
        minimal_from_indices(&indices, params.index_bit_len()),
        minimal
    );

    // Tampering with a single index breaks validation.
    let mut state = initialise_state(&params);
    state.update(&input);
    state.update(nonce.as_bytes());
    let mut tampered = indices.clone();
    tampered[0] ^= 1;
    let bad = minimal_from_indices(&tampered, params.index_bit_len());
    assert!(!is_valid_solution(&params, &state, &bad));
}
