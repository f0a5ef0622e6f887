//! Template assembly and submission scenarios.

use crate::harness::{solve_classical, TestHarness, TEST_NOW};
use bitmark_chain::{
    Algo, Block, BlockHeader, Hash256, Network, OutPoint, Script, COIN, MAX_BLOCK_SIGOPS,
};
use bitmark_mining::{check_work, AssemblerConfig, MinerState, MiningError};

// ============================================================================
// Template shape
// ============================================================================

#[test]
fn test_empty_mempool_template() {
    let harness = TestHarness::new(Network::Mainnet);
    harness.extend_chain(100, 2);
    assert_eq!(harness.state.tip_height(), 100);

    let assembler = harness.assembler(Algo::Scrypt, AssemblerConfig::default());
    let template = assembler
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    assert_eq!(template.block.vtx.len(), 1);
    assert!(template.block.vtx[0].is_coinbase());
    assert_eq!(
        template.block.vtx[0].vout[0].value,
        harness.params.block_value(101, 0)
    );
    assert_eq!(template.tx_fees, vec![0]);
    assert_eq!(template.block_tx, 0);
}

#[test]
fn test_template_header_fields() {
    let harness = TestHarness::regtest();
    let tip_hash = harness.state.tip_hash().unwrap();

    let assembler = harness.assembler(Algo::Sha256d, AssemblerConfig::default());
    let template = assembler
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    let header = &template.block.header;
    assert_eq!(header.hash_prev_block, tip_hash);
    assert_eq!(header.nonce, 0);
    assert_eq!(header.time as u64, TEST_NOW);
    // Regtest fork is active from genesis, so the version carries the tag.
    assert_eq!(header.algo(), Algo::Sha256d);
}

#[test]
fn test_equihash_template_blanks_nonce_and_solution() {
    let harness = TestHarness::regtest();
    let assembler = harness.assembler(Algo::Equihash, AssemblerConfig::default());
    let template = assembler
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    assert_eq!(template.block.header.algo(), Algo::Equihash);
    assert!(template.block.header.nonce256.is_zero());
    assert!(template.block.header.solution.is_empty());
}

// ============================================================================
// Transaction selection
// ============================================================================

#[test]
fn test_dependent_transactions_order_and_fee_slot() {
    let harness = TestHarness::regtest();
    harness.extend_chain(100, 4);

    let coin = harness.fund(100 * COIN, 1);
    let tx_a = harness.spend(coin, 100 * COIN - 10_000);
    let tx_b = harness.spend(OutPoint::new(tx_a.txid(), 0), 100 * COIN - 15_000);

    // Insert the child first; ordering must come from dependencies.
    harness.add_tx(tx_b.clone(), 5_000);
    harness.add_tx(tx_a.clone(), 10_000);

    let assembler = harness.assembler(Algo::Scrypt, AssemblerConfig::default());
    let template = assembler
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    let ids: Vec<_> = template.block.vtx.iter().map(|t| t.txid()).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[1], tx_a.txid());
    assert_eq!(ids[2], tx_b.txid());

    assert_eq!(template.tx_fees, vec![-15_000, 10_000, 5_000]);
    let total: i64 = template.tx_fees[1..].iter().sum();
    assert_eq!(template.tx_fees[0], -total);
    assert_eq!(
        template.block.vtx[0].vout[0].value,
        harness.params.block_value(101, 15_000)
    );
}

#[test]
fn test_free_transaction_excluded_in_fee_mode() {
    let harness = TestHarness::regtest();
    harness.extend_chain(100, 4);

    let coin_free = harness.fund(COIN, 95);
    let free_tx = harness.spend(coin_free, COIN); // zero fee
    let coin_paying = harness.fund(COIN, 95);
    let paying_tx = harness.spend(coin_paying, COIN - 1_000_000);

    harness.add_tx(free_tx.clone(), 0);
    harness.add_tx(paying_tx.clone(), 1_000_000);

    let config = AssemblerConfig {
        priority_size: 0,
        min_size: 0,
        ..Default::default()
    };
    let assembler = harness.assembler(Algo::Scrypt, config);
    let template = assembler
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    let ids: Vec<_> = template.block.vtx.iter().map(|t| t.txid()).collect();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[1], paying_tx.txid());
    assert!(!ids.contains(&free_tx.txid()));
}

#[test]
fn test_fee_dominant_order_with_priority_size_zero() {
    let harness = TestHarness::regtest();
    harness.extend_chain(100, 4);

    // The aged coin would win under priority ordering.
    let aged = harness.fund(50 * COIN, 1);
    let low_fee = harness.spend(aged, 50 * COIN - 2_000);
    let fresh = harness.fund(COIN, 99);
    let high_fee = harness.spend(fresh, COIN - 500_000);

    harness.add_tx(low_fee.clone(), 2_000);
    harness.add_tx(high_fee.clone(), 500_000);

    let config = AssemblerConfig {
        priority_size: 0,
        min_size: 0,
        ..Default::default()
    };
    let assembler = harness.assembler(Algo::Scrypt, config);
    let template = assembler
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    let ids: Vec<_> = template.block.vtx.iter().map(|t| t.txid()).collect();
    assert_eq!(ids[1], high_fee.txid());
    assert_eq!(ids[2], low_fee.txid());
}

#[test]
fn test_dependency_chain_preserves_order() {
    let harness = TestHarness::regtest();
    harness.extend_chain(100, 4);

    let coin = harness.fund(10 * COIN, 1);
    let tx_a = harness.spend(coin, 10 * COIN - 100_000);
    let tx_b = harness.spend(OutPoint::new(tx_a.txid(), 0), 10 * COIN - 200_000);
    let tx_c = harness.spend(OutPoint::new(tx_b.txid(), 0), 10 * COIN - 300_000);
    let lone_coin = harness.fund(COIN, 50);
    let lone = harness.spend(lone_coin, COIN - 50_000);

    for (tx, fee) in [
        (tx_c.clone(), 100_000),
        (lone.clone(), 50_000),
        (tx_a.clone(), 100_000),
        (tx_b.clone(), 100_000),
    ] {
        harness.add_tx(tx, fee);
    }

    let assembler = harness.assembler(Algo::Scrypt, AssemblerConfig::default());
    let template = assembler
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    let ids: Vec<_> = template.block.vtx.iter().map(|t| t.txid()).collect();
    assert_eq!(ids.len(), 5);
    let pos = |id| ids.iter().position(|x| *x == id).unwrap();
    assert!(pos(tx_a.txid()) < pos(tx_b.txid()));
    assert!(pos(tx_b.txid()) < pos(tx_c.txid()));
}

// ============================================================================
// Size limits
// ============================================================================

#[test]
fn test_max_size_boundary_is_exclusive() {
    // A bare single-input single-output spend serializes to 60 bytes; the
    // block size accumulator starts at 1000.
    let harness = TestHarness::regtest();
    harness.extend_chain(100, 4);

    let coin = harness.fund(COIN, 50);
    let tx = harness.spend(coin, COIN - 100_000);
    assert_eq!(tx.serialized_size(), 60);
    harness.add_tx(tx.clone(), 100_000);

    // 1000 + 60 >= 1060: skipped at the exact boundary.
    let config = AssemblerConfig {
        max_size: 1060,
        priority_size: 0,
        min_size: 0,
        ..Default::default()
    };
    let template = harness
        .assembler(Algo::Scrypt, config)
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();
    assert_eq!(template.block.vtx.len(), 1);

    // One byte of headroom admits it.
    let config = AssemblerConfig {
        max_size: 1061,
        priority_size: 0,
        min_size: 0,
        ..Default::default()
    };
    let template = harness
        .assembler(Algo::Scrypt, config)
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();
    assert_eq!(template.block.vtx.len(), 2);
}

#[test]
fn test_template_respects_size_and_sigop_limits() {
    let harness = TestHarness::regtest();
    harness.extend_chain(100, 4);

    for _ in 0..20 {
        let coin = harness.fund(COIN, 50);
        let tx = harness.spend(coin, COIN - 100_000);
        harness.add_tx(tx, 100_000);
    }

    let config = AssemblerConfig {
        max_size: 1400,
        priority_size: 0,
        min_size: 0,
        ..Default::default()
    };
    let template = harness
        .assembler(Algo::Scrypt, config)
        .create_new_block(&harness.state, &harness.mempool, Script::new(), TEST_NOW)
        .unwrap();

    // 1000 + 60 * n < 1400 admits at most six spends.
    assert!(template.block_tx <= 6);
    assert!(template.block_tx >= 1);
    assert!(template.block_size <= 1400);
    let sigops: i64 = template.tx_sigops.iter().sum();
    assert!(sigops <= MAX_BLOCK_SIGOPS as i64);
}

// ============================================================================
// Extra-nonce sequencing
// ============================================================================

#[test]
fn test_extra_nonce_sequence_across_prev_changes() {
    let state = MinerState::new();

    let shell = |prev: u8| Block {
        header: BlockHeader {
            hash_prev_block: Hash256::from_bytes([prev; 32]),
            ..Default::default()
        },
        vtx: vec![bitmark_mining::create_coinbase(Script::new())],
    };

    let mut seen = Vec::new();
    let mut block = shell(0xaa);
    for _ in 0..3 {
        seen.push(state.advance_extra_nonce(&mut block, 100));
    }
    let mut block = shell(0xbb);
    for _ in 0..2 {
        seen.push(state.advance_extra_nonce(&mut block, 101));
    }
    assert_eq!(seen, vec![1, 2, 3, 1, 2]);
}

// ============================================================================
// Submission
// ============================================================================

#[test]
fn test_stale_submission_is_rejected_without_processing() {
    let harness = TestHarness::regtest();
    let ctx = harness.context(Algo::Sha256d, AssemblerConfig::default());

    // Template built on the genesis tip.
    let key = harness.wallet.reserve_key().unwrap();
    let script = bitmark_mining::coinbase_script_for_key(&key.pubkey);
    let assembler = harness.assembler(Algo::Sha256d, AssemblerConfig::default());
    let mut template = assembler
        .create_new_block(&harness.state, &harness.mempool, script, TEST_NOW)
        .unwrap();
    harness
        .miner_state
        .advance_extra_nonce(&mut template.block, 0);
    solve_classical(&mut template.block, Algo::Sha256d);

    // The tip advances before submission.
    harness.mine_block(Algo::Sha256d);
    let tip_after = harness.state.tip_hash();
    assert_eq!(harness.state.tip_height(), 1);

    let result = check_work(&ctx, &template.block, &key);
    assert!(matches!(result, Err(MiningError::Stale)));
    // Nothing was processed: the tip is untouched.
    assert_eq!(harness.state.tip_height(), 1);
    assert_eq!(harness.state.tip_hash(), tip_after);
}

#[test]
fn test_check_work_accepts_fresh_solution() {
    let harness = TestHarness::regtest();
    let ctx = harness.context(Algo::Sha256d, AssemblerConfig::default());

    let key = harness.wallet.reserve_key().unwrap();
    let script = bitmark_mining::coinbase_script_for_key(&key.pubkey);
    let assembler = harness.assembler(Algo::Sha256d, AssemblerConfig::default());
    let mut template = assembler
        .create_new_block(&harness.state, &harness.mempool, script, TEST_NOW)
        .unwrap();
    harness
        .miner_state
        .advance_extra_nonce(&mut template.block, 0);
    solve_classical(&mut template.block, Algo::Sha256d);

    assert!(check_work(&ctx, &template.block, &key).unwrap());
    assert_eq!(harness.state.tip_height(), 1);
    assert_eq!(harness.state.tip_hash(), Some(template.block.hash()));
    // The submitted block's request counter starts at zero.
    assert_eq!(
        harness.wallet.request_count(&template.block.hash()),
        Some(0)
    );
}

#[test]
fn test_mined_transactions_leave_the_mempool() {
    let harness = TestHarness::regtest();
    harness.extend_chain(100, 4);

    let coin = harness.fund(COIN, 50);
    let tx = harness.spend(coin, COIN - 100_000);
    let txid = harness.add_tx(tx, 100_000);
    assert!(harness.mempool.contains(&txid));

    let block = harness.mine_block(Algo::Sha256d);
    assert!(block.vtx.iter().any(|t| t.txid() == txid));
    assert!(!harness.mempool.contains(&txid));
}
