//! Applying two blocks and popping the most recent one back off must leave
//! the database exactly where it was after the first block, including the
//! undo stack's own bookkeeping (`head_block_number`, balances, fees).

mod common;

use common::Fixture;
use ledger_chain_core::core_types::Amount;
use ledger_chain_core::tx::Operation;

#[test]
fn pop_to_reverts_the_most_recent_block() {
    let mut fx = Fixture::build(3, 2);
    let core = fx.core_asset;
    let expiration = fx.head_time() + 100_000;

    let tx1 = fx.sign(
        vec![Operation::Transfer {
            from: fx.accounts[0],
            to: fx.accounts[1],
            amount: Amount(1_000),
            asset_id: core,
        }],
        &[&fx.account_keys[0]],
        expiration,
    );
    fx.chain.queue_transaction(tx1);
    fx.produce_block().expect("block 1 should apply");

    assert_eq!(fx.balance_of(fx.accounts[0], core), Amount(998_990));
    assert_eq!(fx.balance_of(fx.accounts[1], core), Amount(1_001_000));
    assert_eq!(fx.head_block_number(), 1);

    let tx2 = fx.sign(
        vec![Operation::Transfer {
            from: fx.accounts[1],
            to: fx.accounts[2],
            amount: Amount(500),
            asset_id: core,
        }],
        &[&fx.account_keys[1]],
        expiration,
    );
    fx.chain.queue_transaction(tx2);
    fx.produce_block().expect("block 2 should apply");

    assert_eq!(fx.head_block_number(), 2);
    assert_eq!(fx.balance_of(fx.accounts[1], core), Amount(1_000_490));
    assert_eq!(fx.balance_of(fx.accounts[2], core), Amount(1_000_500));

    let popped = fx.chain.pop_to(1).expect("should pop block 2 back off");
    assert_eq!(popped.len(), 1);
    assert_eq!(fx.head_block_number(), 1);

    // Block 2's effects are gone; block 1's remain.
    assert_eq!(fx.balance_of(fx.accounts[0], core), Amount(998_990));
    assert_eq!(fx.balance_of(fx.accounts[1], core), Amount(1_001_000));
    assert_eq!(fx.balance_of(fx.accounts[2], core), Amount(1_000_000));

    let popped_all = fx.chain.pop_to(0).expect("should pop block 1 back off too");
    assert_eq!(popped_all.len(), 1);
    assert_eq!(fx.head_block_number(), 0);
    assert_eq!(fx.balance_of(fx.accounts[0], core), Amount(1_000_000));
    assert_eq!(fx.balance_of(fx.accounts[1], core), Amount(1_000_000));
}

#[test]
fn popping_past_an_empty_undo_stack_fails_instead_of_no_op() {
    let mut fx = Fixture::build(2, 1);
    let expiration = fx.head_time() + 100_000;
    let core = fx.core_asset;

    let tx = fx.sign(
        vec![Operation::Transfer {
            from: fx.accounts[0],
            to: fx.accounts[1],
            amount: Amount(1),
            asset_id: core,
        }],
        &[&fx.account_keys[0]],
        expiration,
    );
    fx.chain.queue_transaction(tx);
    fx.produce_block().expect("block should apply");

    let popped = fx.chain.pop_to(0).expect("should pop the only block");
    assert_eq!(popped.len(), 1);
    assert_eq!(fx.head_block_number(), 0);

    // Nothing left on the undo stack: a further pop must fail rather than
    // silently leave state untouched.
    assert!(fx.chain.undo.pop_block(&mut fx.chain.db).is_err());
}
