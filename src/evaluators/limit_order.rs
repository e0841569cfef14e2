use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ChainTime, ObjectId, Price};
use crate::db::objects::{LimitOrder, OperationResult};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

pub struct LimitOrderCreateEvaluator {
    seller: ObjectId,
    amount_to_sell: Amount,
    sell_price: Price,
    expiration: ChainTime,
    fill_or_kill: bool,
}

impl LimitOrderCreateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::LimitOrderCreate {
                seller,
                amount_to_sell,
                sell_price,
                expiration,
                fill_or_kill,
            } => Ok(Self {
                seller: *seller,
                amount_to_sell: *amount_to_sell,
                sell_price: *sell_price,
                expiration: *expiration,
                fill_or_kill: *fill_or_kill,
            }),
            _ => Err(InvalidOperation::Other("not a LimitOrderCreate").into()),
        }
    }

    fn find_balance(&self, db: &ObjectDatabase) -> ChainResult<ObjectId> {
        db.balances
            .iter()
            .find(|(_, b)| b.owner == self.seller && b.asset_id == self.sell_price.base.asset_id)
            .map(|(id, _)| *id)
            .ok_or_else(|| {
                InvalidOperation::InsufficientBalance {
                    need: self.amount_to_sell.0,
                    have: 0,
                }
                .into()
            })
    }
}

impl Evaluator for LimitOrderCreateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.seller
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let balance_id = self.find_balance(db)?;
        let have = db.balances.get(balance_id)?.amount;
        if have.0 < self.amount_to_sell.0 {
            return Err(InvalidOperation::InsufficientBalance {
                need: self.amount_to_sell.0,
                have: have.0,
            }
            .into());
        }
        Ok(fees.fee_for(FeeKind::LimitOrderCreate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let balance_id = self.find_balance(db)?;
        db.balances.modify(balance_id, undo, |b| {
            b.amount = Amount(b.amount.0 - self.amount_to_sell.0);
        })?;

        let order_id = db.limit_orders.reserve_id();
        db.limit_orders.insert(
            order_id,
            LimitOrder {
                id: order_id,
                seller: self.seller,
                for_sale: self.amount_to_sell,
                sell_price: self.sell_price,
                expiration: self.expiration,
                deferred_fee: fee,
            },
            undo,
        )?;

        let filled = crate::market::match_limit_order(db, undo, order_id)?;
        if self.fill_or_kill && !filled {
            return Err(InvalidOperation::Other(
                "fill_or_kill order did not fill completely",
            )
            .into());
        }

        Ok(OperationResult::ObjectCreated(order_id))
    }
}

pub struct LimitOrderCancelEvaluator {
    fee_paying_account: ObjectId,
    order: ObjectId,
}

impl LimitOrderCancelEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::LimitOrderCancel {
                fee_paying_account,
                order,
            } => Ok(Self {
                fee_paying_account: *fee_paying_account,
                order: *order,
            }),
            _ => Err(InvalidOperation::Other("not a LimitOrderCancel").into()),
        }
    }
}

impl Evaluator for LimitOrderCancelEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.fee_paying_account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let order = db.limit_orders.get(self.order)?;
        if order.seller != self.fee_paying_account {
            return Err(InvalidOperation::Other("only the seller may cancel their order").into());
        }
        Ok(fees.fee_for(FeeKind::LimitOrderCancel))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let order = db.limit_orders.remove(self.order, undo)?;
        return_order_balance(db, undo, &order)?;
        Ok(OperationResult::Void)
    }
}

/// Refunds the unfilled `for_sale` remainder of a cancelled/expired order
/// to its seller.
pub fn return_order_balance(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    order: &LimitOrder,
) -> ChainResult<()> {
    if order.for_sale.is_zero() {
        return Ok(());
    }
    let existing = db
        .balances
        .iter()
        .find(|(_, b)| b.owner == order.seller && b.asset_id == order.sell_price.base.asset_id)
        .map(|(id, _)| *id);
    match existing {
        Some(balance_id) => {
            db.balances.modify(balance_id, undo, |b| {
                b.amount = b.amount.checked_add(order.for_sale).unwrap_or(b.amount);
            })?;
        }
        None => {
            let id = db.balances.reserve_id();
            db.balances.insert(
                id,
                crate::db::objects::Balance {
                    id,
                    owner: order.seller,
                    asset_id: order.sell_price.base.asset_id,
                    amount: order.for_sale,
                },
                undo,
            )?;
        }
    }
    Ok(())
}
