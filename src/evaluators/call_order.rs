use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ObjectId};
use crate::db::objects::{CallOrder, OperationResult};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

pub struct CallOrderUpdateEvaluator {
    funding_account: ObjectId,
    delta_collateral: i64,
    delta_debt: i64,
    asset_id: ObjectId,
    target_collateral_ratio: Option<u16>,
}

impl CallOrderUpdateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::CallOrderUpdate {
                funding_account,
                delta_collateral,
                delta_debt,
                asset_id,
                target_collateral_ratio,
            } => Ok(Self {
                funding_account: *funding_account,
                delta_collateral: *delta_collateral,
                delta_debt: *delta_debt,
                asset_id: *asset_id,
                target_collateral_ratio: *target_collateral_ratio,
            }),
            _ => Err(InvalidOperation::Other("not a CallOrderUpdate").into()),
        }
    }

    fn existing_order(&self, db: &ObjectDatabase) -> Option<ObjectId> {
        db.call_orders
            .iter()
            .find(|(_, o)| o.borrower == self.funding_account && o.call_price.quote.asset_id == self.asset_id)
            .map(|(id, _)| *id)
    }
}

impl Evaluator for CallOrderUpdateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.funding_account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let asset = db.assets.get(self.asset_id)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or(InvalidOperation::Other("asset is not market-issued"))?;
        let bitasset = db.asset_bitasset_data.get(bitasset_id)?;
        if bitasset.globally_settled {
            return Err(crate::error::MarketError::AlreadyGloballySettled.into());
        }

        if bitasset.is_prediction_market && self.delta_collateral != self.delta_debt {
            return Err(crate::error::MarketError::PredictionMarketMismatch.into());
        }

        let existing = self.existing_order(db);
        let (collateral, debt) = match existing {
            Some(id) => {
                let o = db.call_orders.get(id)?;
                (o.collateral, o.debt)
            }
            None => (Amount::ZERO, Amount::ZERO),
        };

        let new_collateral = apply_delta(collateral, self.delta_collateral)?;
        let new_debt = apply_delta(debt, self.delta_debt)?;

        if new_debt.is_zero() && !new_collateral.is_zero() {
            return Err(InvalidOperation::Other(
                "closing all debt must also withdraw remaining collateral",
            )
            .into());
        }

        if !new_debt.is_zero() {
            let mcr = bitasset.current_feed.maintenance_collateral_ratio;
            if !collateral_covers_debt(new_collateral, new_debt, mcr, &bitasset.current_feed.settlement_price) {
                return Err(InvalidOperation::UnderCollateralized.into());
            }
        }

        Ok(fees.fee_for(FeeKind::CallOrderUpdate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let asset = db.assets.get(self.asset_id)?.clone();
        let bitasset_id = asset.bitasset_data.expect("checked in evaluate");
        let bitasset = db.asset_bitasset_data.get(bitasset_id)?.clone();

        move_collateral_and_debt(db, undo, self)?;

        let order_id = match self.existing_order(db) {
            Some(id) => id,
            None => {
                let id = db.call_orders.reserve_id();
                db.call_orders.insert(
                    id,
                    CallOrder {
                        id,
                        borrower: self.funding_account,
                        collateral: Amount::ZERO,
                        debt: Amount::ZERO,
                        call_price: bitasset.current_feed.settlement_price,
                        target_collateral_ratio: self.target_collateral_ratio,
                    },
                    undo,
                )?;
                id
            }
        };

        db.call_orders.modify(order_id, undo, |o| {
            o.collateral = apply_delta(o.collateral, self.delta_collateral).unwrap_or(o.collateral);
            o.debt = apply_delta(o.debt, self.delta_debt).unwrap_or(o.debt);
            o.target_collateral_ratio = self.target_collateral_ratio;
            o.call_price = compute_call_price(o.collateral, o.debt, &bitasset.current_feed.settlement_price, bitasset.current_feed.maintenance_collateral_ratio);
        })?;

        let stats_id = db.accounts.get(self.funding_account)?.statistics;
        db.account_statistics.modify(stats_id, undo, |s| {
            s.total_core_in_orders = Amount(
                (s.total_core_in_orders.0 as i64 + self.delta_collateral).max(0) as u64,
            );
        })?;

        if db.call_orders.get(order_id)?.debt.is_zero() {
            db.call_orders.remove(order_id, undo)?;
            return Ok(OperationResult::Void);
        }

        // `allow_black_swan = false`: an update that would itself force
        // global settlement is rejected outright rather than applied. If
        // the margin-call pass fully covers this order against the book,
        // it must have fully covered to be valid at all — reject rather
        // than silently leave the funding account with no position.
        crate::market::check_margin_calls(db, undo, self.asset_id, false)?;

        if db.call_orders.try_get(order_id).is_none() {
            return Err(InvalidOperation::Other(
                "call order update was immediately consumed by a pending margin call",
            )
            .into());
        }

        Ok(OperationResult::ObjectCreated(order_id))
    }
}

fn move_collateral_and_debt(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    ev: &CallOrderUpdateEvaluator,
) -> ChainResult<()> {
    let asset = db.assets.get(ev.asset_id)?.clone();

    // Collateral is posted in the asset's backing (core) asset; moving
    // `delta_collateral` debits/credits the funding account's balance in
    // that asset, and `delta_debt` mints/burns the market-issued asset.
    let backing_asset = asset.core_exchange_rate.quote.asset_id;
    adjust_balance(db, undo, ev.funding_account, backing_asset, -ev.delta_collateral)?;
    adjust_balance(db, undo, ev.funding_account, ev.asset_id, ev.delta_debt)?;

    db.asset_dynamic_data.modify(asset.dynamic_data, undo, |d| {
        d.current_supply = Amount((d.current_supply.0 as i64 + ev.delta_debt) as u64);
    })?;

    Ok(())
}

fn adjust_balance(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    owner: ObjectId,
    asset_id: ObjectId,
    delta: i64,
) -> ChainResult<()> {
    let existing = db
        .balances
        .iter()
        .find(|(_, b)| b.owner == owner && b.asset_id == asset_id)
        .map(|(id, _)| *id);
    match existing {
        Some(id) => {
            db.balances.modify(id, undo, |b| {
                b.amount = Amount((b.amount.0 as i64 + delta).max(0) as u64);
            })?;
        }
        None if delta > 0 => {
            let id = db.balances.reserve_id();
            db.balances.insert(
                id,
                crate::db::objects::Balance {
                    id,
                    owner,
                    asset_id,
                    amount: Amount(delta as u64),
                },
                undo,
            )?;
        }
        None => {
            return Err(InvalidOperation::InsufficientBalance { need: (-delta) as u64, have: 0 }.into());
        }
    }
    Ok(())
}

fn apply_delta(amount: Amount, delta: i64) -> ChainResult<Amount> {
    let result = amount.0 as i64 + delta;
    if result < 0 {
        return Err(InvalidOperation::InsufficientBalance {
            need: (-delta) as u64,
            have: amount.0,
        }
        .into());
    }
    Ok(Amount(result as u64))
}

/// `collateral / debt >= settlement_price^-1 * MCR/10000`, the spec §4.6
/// undercollateralization check, in cross-multiplied integer form.
fn collateral_covers_debt(
    collateral: Amount,
    debt: Amount,
    mcr: u16,
    settlement_price: &crate::core_types::Price,
) -> bool {
    let collateral_value =
        collateral.0 as u128 * settlement_price.quote.amount.0 as u128 * 10_000u128;
    let debt_value = debt.0 as u128 * settlement_price.base.amount.0 as u128 * mcr as u128;
    collateral_value >= debt_value
}

fn compute_call_price(
    collateral: Amount,
    debt: Amount,
    settlement_price: &crate::core_types::Price,
    mcr: u16,
) -> crate::core_types::Price {
    use crate::core_types::AssetAmount;
    // call_price = (debt * MCR/10000) / collateral, in the same asset pair
    // as settlement_price; triggers a margin call once the feed price
    // falls to or below it.
    let base = AssetAmount::new(
        (debt.0 as u128 * mcr as u128 / 10_000).min(u64::MAX as u128) as u64,
        settlement_price.base.asset_id,
    );
    let quote = AssetAmount::new(collateral.0, settlement_price.quote.asset_id);
    crate::core_types::Price::new(base, quote)
}
