//! Market engine (C6): margin call matching, black swan detection,
//! prediction market settlement, and forced settlement execution.
//!
//! Grounded in the teacher's `engine.rs` BTreeMap order book (the match
//! loop structure — walk the best orders on each side, cross while
//! prices allow, partially fill the loser) generalized from a single
//! limit-order book to also match call orders against the book at their
//! `call_price` and to run the global-settlement payout.

use crate::core_types::{Amount, ChainTime, ObjectId, Price};
use crate::db::objects::{Balance, CallOrder, LimitOrder};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, MarketError};
use rustc_hash::FxHashMap;

/// Matches a freshly created limit order against the resting book for its
/// quote asset, walking best-price-first exactly as the teacher's
/// `engine.rs` match loop does. Returns whether the order filled
/// completely (consumed or cancelled by a full match).
pub fn match_limit_order(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    order_id: ObjectId,
) -> ChainResult<bool> {
    loop {
        let order = match db.limit_orders.try_get(order_id) {
            Some(o) => o.clone(),
            None => return Ok(true), // fully consumed by a previous iteration
        };
        if order.for_sale.is_zero() {
            return Ok(true);
        }

        let quote_asset = order.sell_price.quote.asset_id;
        let counter_price = order.sell_price.invert();

        let best_counter = db
            .limit_orders_for_asset(quote_asset)
            .into_iter()
            .find(|o| o.id != order_id && o.sell_price.less_or_equal(&counter_price))
            .cloned();

        let Some(counter) = best_counter else {
            return Ok(false);
        };

        cross_orders(db, undo, order_id, counter.id)?;
    }
}

/// Executes one match between two crossing limit orders, filling the
/// smaller side completely and the larger side partially, crediting both
/// sellers in the asset they bought.
fn cross_orders(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    a_id: ObjectId,
    b_id: ObjectId,
) -> ChainResult<()> {
    let a = db.limit_orders.get(a_id)?.clone();
    let b = db.limit_orders.get(b_id)?.clone();

    // Trade at the resting order's price (the one that was on the book
    // first by id ordering, matching the teacher's price-time priority).
    let trade_price = if a_id < b_id {
        a.sell_price
    } else {
        b.sell_price.invert()
    };

    let b_capacity = trade_price.invert().convert(b.for_sale).unwrap_or(Amount::ZERO);
    let a_fill = a.for_sale.min(b_capacity);
    let b_receive = trade_price.convert(a_fill).unwrap_or(Amount::ZERO);

    db.limit_orders.modify(a_id, undo, |o| {
        o.for_sale = Amount(o.for_sale.0.saturating_sub(a_fill.0));
    })?;
    db.limit_orders.modify(b_id, undo, |o| {
        o.for_sale = Amount(o.for_sale.0.saturating_sub(b_receive.0));
    })?;

    credit_balance(db, undo, a.seller, b.sell_price.base.asset_id, b_receive)?;
    credit_balance(db, undo, b.seller, a.sell_price.base.asset_id, a_fill)?;

    for (id, order) in [(a_id, &a), (b_id, &b)] {
        if db.limit_orders.get(id)?.for_sale.is_zero() {
            crate::evaluators::limit_order::return_order_balance(db, undo, order)?;
            db.limit_orders.remove(id, undo)?;
        }
    }

    Ok(())
}

fn credit_balance(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    owner: ObjectId,
    asset_id: ObjectId,
    amount: Amount,
) -> ChainResult<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let existing = db
        .balances
        .iter()
        .find(|(_, b)| b.owner == owner && b.asset_id == asset_id)
        .map(|(id, _)| *id);
    match existing {
        Some(id) => {
            db.balances.modify(id, undo, |b| {
                b.amount = b.amount.checked_add(amount).unwrap_or(b.amount);
            })?;
        }
        None => {
            let id = db.balances.reserve_id();
            db.balances.insert(
                id,
                Balance {
                    id,
                    owner,
                    asset_id,
                    amount,
                },
                undo,
            )?;
        }
    }
    Ok(())
}

/// Runs the margin call matching pass for `debt_asset`'s worst-collateralized
/// call orders against the limit order book, following the feed price down
/// until no order remains below its call price or the book runs dry. A
/// black swan (book can't cover the least-collateralized order even at the
/// settlement price) triggers global settlement instead of a partial match,
/// unless `allow_black_swan` is false, in which case the whole pass is
/// rejected instead (spec §4.6; `original_source/libraries/chain/
/// call_order_evaluator.cpp` is the source for this: a `CallOrderUpdate`
/// evaluator calls in with `allow_black_swan = false` so an update that
/// would itself force global settlement is rejected rather than applied,
/// while the periodic maintenance fixup pass calls in with `true`).
pub fn check_margin_calls(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    debt_asset: ObjectId,
    allow_black_swan: bool,
) -> ChainResult<()> {
    loop {
        let asset = db.assets.get(debt_asset)?.clone();
        let Some(bitasset_id) = asset.bitasset_data else {
            return Ok(());
        };
        let bitasset = db.asset_bitasset_data.get(bitasset_id)?.clone();
        if bitasset.globally_settled {
            return Ok(());
        }
        let feed_price = bitasset.current_feed.settlement_price;

        let worst = db
            .call_orders_for_asset(debt_asset)
            .into_iter()
            .find(|o| o.call_price.greater_than(&feed_price))
            .cloned();

        let Some(call_order) = worst else {
            return Ok(());
        };

        if would_black_swan(db, &call_order, &feed_price)? {
            if !allow_black_swan {
                return Err(MarketError::WouldBlackSwan.into());
            }
            trigger_global_settlement(db, undo, debt_asset, feed_price)?;
            return Ok(());
        }

        settle_call_order_against_book(
            db,
            undo,
            &call_order,
            &feed_price,
            bitasset.current_feed.maximum_short_squeeze_ratio,
        )?;
    }
}

fn would_black_swan(
    db: &ObjectDatabase,
    order: &CallOrder,
    feed_price: &Price,
) -> ChainResult<bool> {
    let collateral_value = order.collateral.0 as u128 * feed_price.quote.amount.0 as u128;
    let debt_value = order.debt.0 as u128 * feed_price.base.amount.0 as u128;
    let _ = db;
    Ok(collateral_value < debt_value)
}

/// Matches a single margin-called order against the best resting limit
/// orders until it is fully covered or the book can no longer cover it at
/// the feed price (which would have already been caught by
/// `would_black_swan`).
///
/// Each resting order is filled at the better, for the call order, of its
/// own posted `sell_price` and the feed's settlement price capped by
/// `maximum_short_squeeze_ratio` (spec §4.6): a margin call never pays more
/// collateral per unit of debt covered than either bound allows, so a
/// resting order asking less than the capped feed price fills at its own
/// price instead of skimming the squeeze margin.
fn settle_call_order_against_book(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    order: &CallOrder,
    feed_price: &Price,
    maximum_short_squeeze_ratio: u16,
) -> ChainResult<()> {
    let collateral_asset = order.call_price.quote.asset_id;
    let book: Vec<LimitOrder> = db
        .limit_orders_for_asset(feed_price.base.asset_id)
        .into_iter()
        .filter(|o| o.sell_price.quote.asset_id == collateral_asset)
        .cloned()
        .collect();

    // Collateral-per-debt ratio, capped at the squeeze margin: base/quote
    // stay (collateral, debt) throughout so it compares directly against a
    // resting order's own inverted `sell_price`.
    let feed_price_inv = feed_price.invert();
    let capped_base = crate::evaluator::percent_of(feed_price_inv.base.amount, maximum_short_squeeze_ratio);
    let capped_feed_inv = Price::new(
        crate::core_types::AssetAmount::new(capped_base.0.max(1), feed_price_inv.base.asset_id),
        feed_price_inv.quote,
    );

    let mut remaining_debt = order.debt;
    let mut collateral_recovered = Amount::ZERO;

    for resting in book {
        if remaining_debt.is_zero() {
            break;
        }
        let limit_price_inv = resting.sell_price.invert();
        let fill_price_inv = if limit_price_inv.less_than(&capped_feed_inv) {
            limit_price_inv
        } else {
            capped_feed_inv
        };

        let fill = remaining_debt.min(resting.for_sale);
        if fill.is_zero() {
            continue;
        }
        let collateral_for_fill = fill_price_inv.convert(fill).unwrap_or(Amount::ZERO);

        db.limit_orders.modify(resting.id, undo, |o| {
            o.for_sale = Amount(o.for_sale.0.saturating_sub(fill.0));
        })?;
        credit_balance(db, undo, resting.seller, collateral_asset, collateral_for_fill)?;

        remaining_debt = Amount(remaining_debt.0 - fill.0);
        collateral_recovered = collateral_recovered
            .checked_add(collateral_for_fill)
            .unwrap_or(collateral_recovered);

        if db.limit_orders.get(resting.id)?.for_sale.is_zero() {
            crate::evaluators::limit_order::return_order_balance(db, undo, &resting)?;
            db.limit_orders.remove(resting.id, undo)?;
        }
    }

    db.call_orders.modify(order.id, undo, |o| {
        o.debt = remaining_debt;
        o.collateral = Amount(o.collateral.0.saturating_sub(collateral_recovered.0));
    })?;

    if db.call_orders.get(order.id)?.debt.is_zero() {
        let remaining_collateral = db.call_orders.get(order.id)?.collateral;
        credit_balance(db, undo, order.borrower, collateral_asset, remaining_collateral)?;
        db.call_orders.remove(order.id, undo)?;
    }

    Ok(())
}

/// Freezes `asset_id` at `settle_price`: every outstanding call order's
/// collateral becomes the settlement fund, and holders of the asset settle
/// against it at `settle_price` via `AssetSettle` (spec §4.6). Once
/// triggered, no more call order updates or new limit orders on the asset
/// are accepted.
pub fn trigger_global_settlement(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    asset_id: ObjectId,
    settle_price: Price,
) -> ChainResult<()> {
    let asset = db.assets.get(asset_id)?.clone();
    let bitasset_id = asset
        .bitasset_data
        .ok_or(MarketError::AlreadyGloballySettled)?;

    let call_order_ids: Vec<ObjectId> = db
        .call_orders_for_asset(asset_id)
        .into_iter()
        .map(|o| o.id)
        .collect();

    let mut settlement_fund = Amount::ZERO;
    for id in call_order_ids {
        let order = db.call_orders.remove(id, undo)?;
        settlement_fund = settlement_fund
            .checked_add(order.collateral)
            .unwrap_or(settlement_fund);
    }

    db.asset_bitasset_data.modify(bitasset_id, undo, |b| {
        b.globally_settled = true;
        b.settlement_price = settle_price;
        b.settlement_fund = settlement_fund;
    })?;

    Ok(())
}

/// Buys the required amount of debt for every due `ForceSettlement` from
/// the cheapest call orders at `feed_price` minus
/// `force_settlement_offset_percent`, capped at
/// `maximum_force_settlement_volume` of the asset's current supply per
/// maintenance period (spec §4.6, §4.5 `ForceSettlement` edge cases).
/// Settlements that can't be fully filled this pass are left due again at
/// the next block.
pub fn process_force_settlements(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    now: ChainTime,
) -> ChainResult<()> {
    let due: Vec<ObjectId> = db
        .force_settlements
        .iter()
        .filter(|(_, s)| s.settlement_date <= now)
        .map(|(id, _)| *id)
        .collect();

    let mut volume_used: FxHashMap<ObjectId, Amount> = FxHashMap::default();

    for id in due {
        let settlement = match db.force_settlements.try_get(id) {
            Some(s) => s.clone(),
            None => continue,
        };
        settle_one_force_settlement(db, undo, id, &settlement, &mut volume_used)?;
    }
    Ok(())
}

fn settle_one_force_settlement(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    id: ObjectId,
    settlement: &crate::db::objects::ForceSettlement,
    volume_used: &mut FxHashMap<ObjectId, Amount>,
) -> ChainResult<()> {
    let asset = db.assets.get(settlement.asset_id)?.clone();
    let Some(bitasset_id) = asset.bitasset_data else {
        db.force_settlements.remove(id, undo)?;
        return Ok(());
    };
    let bitasset = db.asset_bitasset_data.get(bitasset_id)?.clone();
    if bitasset.globally_settled {
        db.force_settlements.remove(id, undo)?;
        return Ok(());
    }

    let dynamic = db.asset_dynamic_data.get(asset.dynamic_data)?.clone();
    let cap = crate::evaluator::percent_of(
        dynamic.current_supply,
        bitasset.options.maximum_force_settlement_volume,
    );
    let used = volume_used.entry(settlement.asset_id).or_insert(Amount::ZERO);
    if used.0 >= cap.0 {
        return Ok(()); // cap reached this pass; try again next block
    }

    let offset_price = apply_offset(
        &bitasset.current_feed.settlement_price,
        bitasset.options.force_settlement_offset_percent,
    );

    let remaining_cap = Amount(cap.0 - used.0);
    let settle_amount = settlement.balance.min(remaining_cap);

    let book: Vec<CallOrder> = db
        .call_orders_for_asset(settlement.asset_id)
        .into_iter()
        .cloned()
        .collect();

    let mut remaining = settle_amount;
    for call in book {
        if remaining.is_zero() {
            break;
        }
        let debt_bought = remaining.min(call.debt);
        let collateral_paid = offset_price.invert().convert(debt_bought).unwrap_or(Amount::ZERO);

        db.call_orders.modify(call.id, undo, |c| {
            c.debt = Amount(c.debt.0 - debt_bought.0);
            c.collateral = Amount(c.collateral.0.saturating_sub(collateral_paid.0));
        })?;
        credit_balance(db, undo, settlement.owner, offset_price.quote.asset_id, collateral_paid)?;
        if db.call_orders.get(call.id)?.debt.is_zero() {
            let refund = db.call_orders.get(call.id)?.collateral;
            credit_balance(db, undo, call.borrower, offset_price.quote.asset_id, refund)?;
            db.call_orders.remove(call.id, undo)?;
        }

        remaining = Amount(remaining.0 - debt_bought.0);
    }

    let filled = Amount(settle_amount.0 - remaining.0);
    *used = used.checked_add(filled).unwrap_or(*used);

    let still_owed = Amount(settlement.balance.0 - filled.0);
    if still_owed.is_zero() {
        db.force_settlements.remove(id, undo)?;
    } else {
        db.force_settlements.modify(id, undo, |s| {
            s.balance = still_owed;
        })?;
    }
    Ok(())
}

fn apply_offset(price: &Price, offset_percent: u16) -> Price {
    let base_amount = crate::evaluator::percent_of(price.base.amount, 10_000u16.saturating_sub(offset_percent));
    Price::new(
        crate::core_types::AssetAmount::new(base_amount.0.max(1), price.base.asset_id),
        price.quote,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{protocol_types, AssetAmount, Space};

    fn asset(n: u64) -> ObjectId {
        ObjectId::new(Space::Protocol, protocol_types::ASSET, n)
    }

    fn account(n: u64) -> ObjectId {
        ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, n)
    }

    #[test]
    fn matching_two_crossing_orders_fills_both() {
        let mut db = ObjectDatabase::new();
        let mut undo = UndoStack::new();
        undo.push_session();

        let core = asset(0);
        let usd = asset(1);

        // Seller A: sells 100 core at price 1 core = 1 usd (wants >=100 usd)
        let a_id = db.limit_orders.reserve_id();
        db.limit_orders
            .insert(
                a_id,
                LimitOrder {
                    id: a_id,
                    seller: account(1),
                    for_sale: Amount(100),
                    sell_price: Price::new(AssetAmount::new(100, core), AssetAmount::new(100, usd)),
                    expiration: u32::MAX,
                    deferred_fee: Amount::ZERO,
                },
                &mut undo,
            )
            .unwrap();

        // Seller B: sells 100 usd at price 1 usd = 1 core (wants >=100 core)
        let b_id = db.limit_orders.reserve_id();
        db.limit_orders
            .insert(
                b_id,
                LimitOrder {
                    id: b_id,
                    seller: account(2),
                    for_sale: Amount(100),
                    sell_price: Price::new(AssetAmount::new(100, usd), AssetAmount::new(100, core)),
                    expiration: u32::MAX,
                    deferred_fee: Amount::ZERO,
                },
                &mut undo,
            )
            .unwrap();

        let filled = match_limit_order(&mut db, &mut undo, a_id).unwrap();
        assert!(filled);
        assert!(db.limit_orders.try_get(a_id).is_none());
        assert!(db.limit_orders.try_get(b_id).is_none());
    }

    #[test]
    fn global_settlement_clears_all_call_orders() {
        let mut db = ObjectDatabase::new();
        let mut undo = UndoStack::new();
        undo.push_session();

        let core = asset(0);
        let bitusd = asset(1);
        let dyn_id = db.asset_dynamic_data.reserve_id();
        db.asset_dynamic_data
            .insert(dyn_id, Default::default(), &mut undo)
            .unwrap();
        let bitasset_id = db.asset_bitasset_data.reserve_id();
        let feed = crate::db::objects::PriceFeed {
            settlement_price: Price::new(AssetAmount::new(1, bitusd), AssetAmount::new(1, core)),
            maintenance_collateral_ratio: 1_750,
            maximum_short_squeeze_ratio: 1_500,
            core_exchange_rate: Price::new(AssetAmount::new(1, bitusd), AssetAmount::new(1, core)),
        };
        db.asset_bitasset_data
            .insert(
                bitasset_id,
                crate::db::objects::AssetBitassetData {
                    id: bitasset_id,
                    asset_id: bitusd,
                    feeds: Default::default(),
                    current_feed: feed,
                    current_feed_publication_time: 0,
                    options: crate::db::objects::BitassetOptions {
                        feed_lifetime: 86_400,
                        minimum_feeds: 1,
                        force_settlement_delay: 3_600,
                        force_settlement_offset_percent: 100,
                        maximum_force_settlement_volume: 2_000,
                    },
                    is_prediction_market: false,
                    settlement_price: feed.settlement_price,
                    settlement_fund: Amount::ZERO,
                    globally_settled: false,
                },
                &mut undo,
            )
            .unwrap();
        db.assets
            .insert(
                bitusd,
                crate::db::objects::Asset {
                    id: bitusd,
                    symbol: "BITUSD".into(),
                    precision: 4,
                    issuer: account(0),
                    dynamic_data: dyn_id,
                    bitasset_data: Some(bitasset_id),
                    is_market_issued: true,
                    market_fee_percent: 0,
                    max_market_fee: Amount::ZERO,
                    core_exchange_rate: feed.core_exchange_rate,
                },
                &mut undo,
            )
            .unwrap();

        let call_id = db.call_orders.reserve_id();
        db.call_orders
            .insert(
                call_id,
                CallOrder {
                    id: call_id,
                    borrower: account(1),
                    collateral: Amount(50),
                    debt: Amount(100),
                    call_price: feed.settlement_price,
                    target_collateral_ratio: None,
                },
                &mut undo,
            )
            .unwrap();

        trigger_global_settlement(&mut db, &mut undo, bitusd, feed.settlement_price).unwrap();

        assert!(db.call_orders.try_get(call_id).is_none());
        assert!(db.asset_bitasset_data.get(bitasset_id).unwrap().globally_settled);
        assert_eq!(
            db.asset_bitasset_data.get(bitasset_id).unwrap().settlement_fund,
            Amount(50)
        );
    }

    /// A margin-called order with enough resting book depth to fully cover
    /// it never reaches `would_black_swan`, and each resting order fills at
    /// whichever is lower: its own posted price, or the feed price capped by
    /// `maximum_short_squeeze_ratio` — not flatly at the feed price.
    #[test]
    fn margin_call_fills_against_the_book_at_the_capped_or_limit_price() {
        let mut db = ObjectDatabase::new();
        let mut undo = UndoStack::new();
        undo.push_session();

        let core = asset(0);
        let bitusd = asset(1);

        let feed = crate::db::objects::PriceFeed {
            settlement_price: Price::new(AssetAmount::new(1_000, bitusd), AssetAmount::new(1_000, core)),
            maintenance_collateral_ratio: 1_750,
            maximum_short_squeeze_ratio: 11_000, // 110% of the feed price, parts-per-10000
            core_exchange_rate: Price::new(AssetAmount::new(1_000, bitusd), AssetAmount::new(1_000, core)),
        };

        let dyn_id = db.asset_dynamic_data.reserve_id();
        db.asset_dynamic_data.insert(dyn_id, Default::default(), &mut undo).unwrap();
        let bitasset_id = db.asset_bitasset_data.reserve_id();
        db.asset_bitasset_data
            .insert(
                bitasset_id,
                crate::db::objects::AssetBitassetData {
                    id: bitasset_id,
                    asset_id: bitusd,
                    feeds: Default::default(),
                    current_feed: feed,
                    current_feed_publication_time: 0,
                    options: crate::db::objects::BitassetOptions {
                        feed_lifetime: 86_400,
                        minimum_feeds: 1,
                        force_settlement_delay: 3_600,
                        force_settlement_offset_percent: 100,
                        maximum_force_settlement_volume: 2_000,
                    },
                    is_prediction_market: false,
                    settlement_price: feed.settlement_price,
                    settlement_fund: Amount::ZERO,
                    globally_settled: false,
                },
                &mut undo,
            )
            .unwrap();
        db.assets
            .insert(
                bitusd,
                crate::db::objects::Asset {
                    id: bitusd,
                    symbol: "BITUSD".into(),
                    precision: 4,
                    issuer: account(0),
                    dynamic_data: dyn_id,
                    bitasset_data: Some(bitasset_id),
                    is_market_issued: true,
                    market_fee_percent: 0,
                    max_market_fee: Amount::ZERO,
                    core_exchange_rate: feed.core_exchange_rate,
                },
                &mut undo,
            )
            .unwrap();

        let borrower = account(1);
        let call_id = db.call_orders.reserve_id();
        db.call_orders
            .insert(
                call_id,
                CallOrder {
                    id: call_id,
                    borrower,
                    collateral: Amount(175),
                    debt: Amount(100),
                    // Above the feed price, so this order is the one the
                    // margin-call pass picks up.
                    call_price: Price::new(AssetAmount::new(2, bitusd), AssetAmount::new(1, core)),
                    target_collateral_ratio: None,
                },
                &mut undo,
            )
            .unwrap();

        // Cheaper than the capped feed price (0.9 core/bit): fills at its
        // own ask, 40 bit for 36 core.
        let cheap_seller = account(2);
        let cheap_id = db.limit_orders.reserve_id();
        db.limit_orders
            .insert(
                cheap_id,
                LimitOrder {
                    id: cheap_id,
                    seller: cheap_seller,
                    for_sale: Amount(40),
                    sell_price: Price::new(AssetAmount::new(40, bitusd), AssetAmount::new(36, core)),
                    expiration: u32::MAX,
                    deferred_fee: Amount::ZERO,
                },
                &mut undo,
            )
            .unwrap();

        // Pricier than the cap (1.3 core/bit): the call only ever pays the
        // capped 1.1 core/bit for this one, 60 bit for 66 core, not the 78
        // core the order's own price asks for.
        let expensive_seller = account(3);
        let expensive_id = db.limit_orders.reserve_id();
        db.limit_orders
            .insert(
                expensive_id,
                LimitOrder {
                    id: expensive_id,
                    seller: expensive_seller,
                    for_sale: Amount(60),
                    sell_price: Price::new(AssetAmount::new(60, bitusd), AssetAmount::new(78, core)),
                    expiration: u32::MAX,
                    deferred_fee: Amount::ZERO,
                },
                &mut undo,
            )
            .unwrap();

        check_margin_calls(&mut db, &mut undo, bitusd, false).unwrap();

        assert!(db.call_orders.try_get(call_id).is_none());
        assert!(db.limit_orders.try_get(cheap_id).is_none());
        assert!(db.limit_orders.try_get(expensive_id).is_none());

        let balance_of = |owner: ObjectId| {
            db.balances
                .iter()
                .find(|(_, b)| b.owner == owner && b.asset_id == core)
                .map(|(_, b)| b.amount)
                .unwrap_or(Amount::ZERO)
        };
        assert_eq!(balance_of(cheap_seller), Amount(36));
        assert_eq!(balance_of(expensive_seller), Amount(66));
        // 175 collateral minus 36 and 66 recovered, refunded on full cover.
        assert_eq!(balance_of(borrower), Amount(73));
    }
}
