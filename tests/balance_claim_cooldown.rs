//! Unclaimed genesis balances are addressed by a derived address rather
//! than an account id, and a claiming account can only pull from one once
//! per cooldown period.

mod common;

use common::Fixture;
use ledger_chain_core::core_types::{protocol_types, Amount, ObjectId, Space};
use ledger_chain_core::crypto::{AddressEncoding, PublicKey};
use ledger_chain_core::db::objects::Balance;
use ledger_chain_core::error::{ChainError, InvalidOperation};
use ledger_chain_core::evaluators::balance_claim::genesis_balance_object_id;
use ledger_chain_core::tx::Operation;
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;

const GENESIS_DEPOSIT: u64 = 1_000;

fn seed_unclaimed_balance(fx: &mut Fixture, key: &SigningKey, amount: Amount) -> ObjectId {
    let pk = PublicKey::from_verifying_key(key.verifying_key());
    let address = pk.to_address(AddressEncoding::Current);
    let balance_id = genesis_balance_object_id(&address);

    fx.chain.undo.push_session();
    fx.chain
        .db
        .balances
        .insert(
            balance_id,
            Balance {
                id: balance_id,
                owner: ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, u64::MAX),
                asset_id: fx.core_asset,
                amount,
            },
            &mut fx.chain.undo,
        )
        .unwrap();
    fx.chain.undo.commit_session().unwrap();

    balance_id
}

#[test]
fn a_second_claim_within_the_cooldown_window_is_rejected() {
    let mut fx = Fixture::build(1, 1);
    let core = fx.core_asset;
    let account0 = fx.accounts[0];
    let genesis_key = SigningKey::random(&mut OsRng);
    let genesis_pk = PublicKey::from_verifying_key(genesis_key.verifying_key());
    let balance_id = seed_unclaimed_balance(&mut fx, &genesis_key, Amount(GENESIS_DEPOSIT));

    fx.eval(&Operation::BalanceClaim {
        deposit_to_account: account0,
        balance_owner_key: genesis_pk,
        total_claimed: Amount(500),
        asset_id: core,
    })
    .expect("first claim should succeed");

    assert_eq!(fx.balance_of(account0, core), Amount(1_000_500));
    assert_eq!(
        fx.chain.db.balances.get(balance_id).unwrap().amount,
        Amount(500)
    );

    let stats_id = fx.chain.db.accounts.get(account0).unwrap().statistics;
    assert_eq!(
        fx.chain.db.account_statistics.get(stats_id).unwrap().last_balance_claim,
        fx.head_time(),
    );

    let second = fx.eval(&Operation::BalanceClaim {
        deposit_to_account: account0,
        balance_owner_key: genesis_pk,
        total_claimed: Amount(100),
        asset_id: core,
    });
    assert_eq!(
        second.unwrap_err(),
        ChainError::Invalid(InvalidOperation::BalanceClaimedTooOften)
    );

    // The rejected claim must not have touched the remaining balance.
    assert_eq!(
        fx.chain.db.balances.get(balance_id).unwrap().amount,
        Amount(500)
    );
}

#[test]
fn claiming_more_than_the_remaining_deposit_is_rejected() {
    let mut fx = Fixture::build(1, 1);
    let core = fx.core_asset;
    let account0 = fx.accounts[0];
    let genesis_key = SigningKey::random(&mut OsRng);
    let genesis_pk = PublicKey::from_verifying_key(genesis_key.verifying_key());
    let _balance_id = seed_unclaimed_balance(&mut fx, &genesis_key, Amount(GENESIS_DEPOSIT));

    let result = fx.eval(&Operation::BalanceClaim {
        deposit_to_account: account0,
        balance_owner_key: genesis_pk,
        total_claimed: Amount(GENESIS_DEPOSIT + 1),
        asset_id: core,
    });
    assert!(result.is_err());
}
