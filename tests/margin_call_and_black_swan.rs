//! Collateralized debt positions stay open as long as the price feed keeps
//! them above their call price; once the feed crashes far enough that the
//! book could not possibly cover the position even at the feed price, the
//! margin-call pass triggers global settlement instead of a partial match.

mod common;

use common::Fixture;
use ledger_chain_core::core_types::{protocol_types, Amount, AssetAmount, ObjectId, Price, Space};
use ledger_chain_core::db::objects::{BitassetOptions, PriceFeed};
use ledger_chain_core::tx::Operation;

fn bitusd_options() -> BitassetOptions {
    BitassetOptions {
        feed_lifetime: 86_400,
        minimum_feeds: 1,
        force_settlement_delay: 3_600,
        force_settlement_offset_percent: 100,
        maximum_force_settlement_volume: 10_000,
    }
}

#[test]
fn adequately_collateralized_call_order_survives_creation() {
    let mut fx = Fixture::build(2, 1);
    let core = fx.core_asset;
    let issuer = fx.accounts[0];
    let borrower = fx.accounts[1];
    let expiration = fx.head_time() + 100_000;

    // First asset created beyond the fixture's own core asset (instance 0).
    let bitusd = ObjectId::new(Space::Protocol, protocol_types::ASSET, 1);

    let tx = fx.sign(
        vec![
            Operation::AssetCreate {
                issuer,
                symbol: "BITUSD".into(),
                precision: 4,
                is_market_issued: true,
                market_fee_percent: 0,
                max_market_fee: Amount::ZERO,
                core_exchange_rate: Price::new(AssetAmount::new(1, bitusd), AssetAmount::new(2, core)),
                bitasset_opts: Some(bitusd_options()),
            },
            Operation::CallOrderUpdate {
                funding_account: borrower,
                delta_collateral: 400,
                delta_debt: 1_000,
                asset_id: bitusd,
                target_collateral_ratio: None,
            },
        ],
        &[&fx.account_keys[0], &fx.account_keys[1]],
        expiration,
    );
    fx.chain.queue_transaction(tx);
    fx.produce_block().expect("asset creation and call order should apply");

    assert_eq!(fx.balance_of(issuer, core), Amount(999_990));
    assert_eq!(fx.balance_of(borrower, core), Amount(999_590));
    assert_eq!(fx.balance_of(borrower, bitusd), Amount(1_000));

    let (_, order) = fx
        .chain
        .db
        .call_orders
        .iter()
        .find(|(_, o)| o.borrower == borrower)
        .expect("call order should exist");
    assert_eq!(order.collateral, Amount(400));
    assert_eq!(order.debt, Amount(1_000));

    let bitasset_id = fx.chain.db.assets.get(bitusd).unwrap().bitasset_data.unwrap();
    assert!(!fx.chain.db.asset_bitasset_data.get(bitasset_id).unwrap().globally_settled);
}

#[test]
fn a_severe_price_crash_triggers_global_settlement() {
    let mut fx = Fixture::build(2, 1);
    let core = fx.core_asset;
    let issuer = fx.accounts[0];
    let borrower = fx.accounts[1];
    let expiration = fx.head_time() + 100_000;

    let bitusd = ObjectId::new(Space::Protocol, protocol_types::ASSET, 1);

    let tx = fx.sign(
        vec![
            Operation::AssetCreate {
                issuer,
                symbol: "BITUSD".into(),
                precision: 4,
                is_market_issued: true,
                market_fee_percent: 0,
                max_market_fee: Amount::ZERO,
                core_exchange_rate: Price::new(AssetAmount::new(1, bitusd), AssetAmount::new(2, core)),
                bitasset_opts: Some(bitusd_options()),
            },
            Operation::CallOrderUpdate {
                funding_account: borrower,
                delta_collateral: 400,
                delta_debt: 1_000,
                asset_id: bitusd,
                target_collateral_ratio: None,
            },
        ],
        &[&fx.account_keys[0], &fx.account_keys[1]],
        expiration,
    );
    fx.chain.queue_transaction(tx);
    fx.produce_block().expect("asset creation and call order should apply");

    // Collateral (core) is worth 2.4x its debt (bitusd) at this feed: a
    // crash severe enough that 400 core can no longer cover 1000 bitusd of
    // debt at the new feed price.
    let crash_feed = PriceFeed {
        settlement_price: Price::new(AssetAmount::new(100, bitusd), AssetAmount::new(240, core)),
        maintenance_collateral_ratio: 1_750,
        maximum_short_squeeze_ratio: 1_500,
        core_exchange_rate: Price::new(AssetAmount::new(100, bitusd), AssetAmount::new(240, core)),
    };
    let tx2 = fx.sign(
        vec![Operation::AssetUpdateFeed {
            publisher: issuer,
            asset_id: bitusd,
            feed: crash_feed,
        }],
        &[&fx.account_keys[0]],
        expiration,
    );
    fx.chain.queue_transaction(tx2);
    fx.produce_block()
        .expect("feed update should apply and trigger the margin-call fixup pass");

    let bitasset_id = fx.chain.db.assets.get(bitusd).unwrap().bitasset_data.unwrap();
    let bitasset = fx.chain.db.asset_bitasset_data.get(bitasset_id).unwrap();
    assert!(bitasset.globally_settled);
    assert_eq!(bitasset.settlement_fund, Amount(400));

    assert!(fx
        .chain
        .db
        .call_orders
        .iter()
        .find(|(_, o)| o.borrower == borrower)
        .is_none());
}
