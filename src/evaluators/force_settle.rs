use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ObjectId, Price};
use crate::db::objects::{ForceSettlement, OperationResult};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation, MarketError};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

pub struct AssetSettleEvaluator {
    account: ObjectId,
    amount: Amount,
    asset_id: ObjectId,
}

impl AssetSettleEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::AssetSettle {
                account,
                amount,
                asset_id,
            } => Ok(Self {
                account: *account,
                amount: *amount,
                asset_id: *asset_id,
            }),
            _ => Err(InvalidOperation::Other("not an AssetSettle").into()),
        }
    }

    fn find_balance(&self, db: &ObjectDatabase) -> ChainResult<ObjectId> {
        db.balances
            .iter()
            .find(|(_, b)| b.owner == self.account && b.asset_id == self.asset_id)
            .map(|(id, _)| *id)
            .ok_or_else(|| {
                InvalidOperation::InsufficientBalance {
                    need: self.amount.0,
                    have: 0,
                }
                .into()
            })
    }
}

impl Evaluator for AssetSettleEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let asset = db.assets.get(self.asset_id)?;
        let bitasset_id = asset
            .bitasset_data
            .ok_or(InvalidOperation::Other("asset is not market-issued"))?;
        let bitasset = db.asset_bitasset_data.get(bitasset_id)?;
        if bitasset.globally_settled {
            return Err(InvalidOperation::Other(
                "use immediate settlement payout once globally settled, not AssetSettle",
            )
            .into());
        }
        let balance_id = self.find_balance(db)?;
        let have = db.balances.get(balance_id)?.amount;
        if have.0 < self.amount.0 {
            return Err(InvalidOperation::InsufficientBalance {
                need: self.amount.0,
                have: have.0,
            }
            .into());
        }
        Ok(fees.fee_for(FeeKind::AssetSettle))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let balance_id = self.find_balance(db)?;
        db.balances.modify(balance_id, undo, |b| {
            b.amount = Amount(b.amount.0 - self.amount.0);
        })?;

        let asset = db.assets.get(self.asset_id)?.clone();
        let bitasset_id = asset.bitasset_data.expect("checked in evaluate");
        let delay = db.asset_bitasset_data.get(bitasset_id)?.options.force_settlement_delay;
        let now = db
            .dynamic_global_properties
            .iter()
            .next()
            .map(|(_, p)| p.time)
            .unwrap_or(0);

        let id = db.force_settlements.reserve_id();
        db.force_settlements.insert(
            id,
            ForceSettlement {
                id,
                owner: self.account,
                asset_id: self.asset_id,
                balance: self.amount,
                settlement_date: now + delay,
            },
            undo,
        )?;

        Ok(OperationResult::ObjectCreated(id))
    }
}

pub struct AssetGlobalSettleEvaluator {
    issuer: ObjectId,
    asset_id: ObjectId,
    settle_price: Price,
}

impl AssetGlobalSettleEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::AssetGlobalSettle {
                issuer,
                asset_id,
                settle_price,
            } => Ok(Self {
                issuer: *issuer,
                asset_id: *asset_id,
                settle_price: *settle_price,
            }),
            _ => Err(InvalidOperation::Other("not an AssetGlobalSettle").into()),
        }
    }
}

impl Evaluator for AssetGlobalSettleEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.issuer
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let asset = db.assets.get(self.asset_id)?;
        if asset.issuer != self.issuer {
            return Err(InvalidOperation::Other("only the asset issuer may trigger global settlement").into());
        }
        let bitasset_id = asset
            .bitasset_data
            .ok_or(InvalidOperation::Other("asset is not market-issued"))?;
        let bitasset = db.asset_bitasset_data.get(bitasset_id)?;
        if bitasset.globally_settled {
            return Err(MarketError::AlreadyGloballySettled.into());
        }
        Ok(fees.fee_for(FeeKind::AssetGlobalSettle))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        crate::market::trigger_global_settlement(db, undo, self.asset_id, self.settle_price)?;
        Ok(OperationResult::Void)
    }
}
