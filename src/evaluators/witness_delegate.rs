use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ObjectId};
use crate::crypto::PublicKey;
use crate::db::objects::{OperationResult, Witness};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

pub struct WitnessCreateEvaluator {
    witness_account: ObjectId,
    signing_key: PublicKey,
}

impl WitnessCreateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::WitnessCreate {
                witness_account,
                signing_key,
            } => Ok(Self {
                witness_account: *witness_account,
                signing_key: *signing_key,
            }),
            _ => Err(InvalidOperation::Other("not a WitnessCreate").into()),
        }
    }
}

impl Evaluator for WitnessCreateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.witness_account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        db.accounts.get(self.witness_account)?;
        if db
            .witnesses
            .iter()
            .any(|(_, w)| w.witness_account == self.witness_account)
        {
            return Err(InvalidOperation::Other("account is already a witness").into());
        }
        Ok(fees.fee_for(FeeKind::WitnessCreate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let id = db.witnesses.reserve_id();
        db.witnesses.insert(
            id,
            Witness {
                id,
                witness_account: self.witness_account,
                signing_key: self.signing_key,
                last_confirmed_block_num: 0,
                total_votes: Amount::ZERO,
                total_missed: 0,
                next_secret_hash: crate::tx::truncate_digest(crate::crypto::sha256(&self.signing_key.0)),
            },
            undo,
        )?;
        Ok(OperationResult::ObjectCreated(id))
    }
}

pub struct WitnessUpdateEvaluator {
    witness: ObjectId,
    witness_account: ObjectId,
    new_signing_key: Option<PublicKey>,
}

impl WitnessUpdateEvaluator {
    pub fn from_op(db: &ObjectDatabase, op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::WitnessUpdate {
                witness,
                new_signing_key,
            } => Ok(Self {
                witness: *witness,
                witness_account: db.witnesses.get(*witness)?.witness_account,
                new_signing_key: *new_signing_key,
            }),
            _ => Err(InvalidOperation::Other("not a WitnessUpdate").into()),
        }
    }
}

impl Evaluator for WitnessUpdateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.witness_account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        db.witnesses.get(self.witness)?;
        Ok(fees.fee_for(FeeKind::WitnessUpdate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        if let Some(new_key) = self.new_signing_key {
            db.witnesses.modify(self.witness, undo, |w| {
                w.signing_key = new_key;
            })?;
        }
        Ok(OperationResult::Void)
    }
}
