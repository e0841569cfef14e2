use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ObjectId};
use crate::db::objects::OperationResult;
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

pub struct TransferEvaluator {
    from: ObjectId,
    to: ObjectId,
    amount: Amount,
    asset_id: ObjectId,
}

impl TransferEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::Transfer {
                from,
                to,
                amount,
                asset_id,
            } => Ok(Self {
                from: *from,
                to: *to,
                amount: *amount,
                asset_id: *asset_id,
            }),
            _ => Err(InvalidOperation::Other("not a Transfer").into()),
        }
    }

    fn find_balance(&self, db: &ObjectDatabase, owner: ObjectId) -> ChainResult<ObjectId> {
        db.balances
            .iter()
            .find(|(_, b)| b.owner == owner && b.asset_id == self.asset_id)
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

impl Evaluator for TransferEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.from
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let from_balance = self.find_balance(db, self.from)?;
        let have = db.balances.get(from_balance)?.amount;
        if have.0 < self.amount.0 {
            return Err(InvalidOperation::InsufficientBalance {
                need: self.amount.0,
                have: have.0,
            }
            .into());
        }
        Ok(fees.fee_for(FeeKind::Transfer))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let from_balance = self.find_balance(db, self.from)?;
        db.balances
            .modify(from_balance, undo, |b| {
                b.amount = Amount(b.amount.0 - self.amount.0);
            })?;

        match self.find_balance(db, self.to) {
            Ok(to_balance) => {
                db.balances.modify(to_balance, undo, |b| {
                    b.amount = b.amount.checked_add(self.amount).unwrap_or(b.amount);
                })?;
            }
            Err(_) => {
                let id = db.balances.reserve_id();
                db.balances.insert(
                    id,
                    crate::db::objects::Balance {
                        id,
                        owner: self.to,
                        asset_id: self.asset_id,
                        amount: self.amount,
                    },
                    undo,
                )?;
            }
        }

        Ok(OperationResult::Void)
    }
}
