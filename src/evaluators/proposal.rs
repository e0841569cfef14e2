use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ChainTime, ObjectId};
use crate::db::objects::{OperationResult, Proposal};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

pub struct ProposalCreateEvaluator {
    fee_paying_account: ObjectId,
    expiration_time: ChainTime,
    proposed_ops: Vec<Operation>,
}

impl ProposalCreateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::ProposalCreate {
                fee_paying_account,
                expiration_time,
                proposed_ops,
            } => Ok(Self {
                fee_paying_account: *fee_paying_account,
                expiration_time: *expiration_time,
                proposed_ops: proposed_ops.clone(),
            }),
            _ => Err(InvalidOperation::Other("not a ProposalCreate").into()),
        }
    }
}

impl Evaluator for ProposalCreateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.fee_paying_account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        db.accounts.get(self.fee_paying_account)?;
        if self.proposed_ops.is_empty() {
            return Err(InvalidOperation::Other("proposal has no operations").into());
        }
        Ok(fees.fee_for(FeeKind::ProposalCreate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let required_active: Vec<ObjectId> = self
            .proposed_ops
            .iter()
            .map(|op| crate::evaluator::fee_payer(db, op))
            .collect();

        let id = db.proposals.reserve_id();
        db.proposals.insert(
            id,
            Proposal {
                id,
                expiration_time: self.expiration_time,
                proposed_ops: self.proposed_ops.clone(),
                required_active_approvals: required_active,
                required_owner_approvals: vec![],
                available_active_approvals: vec![],
                available_owner_approvals: vec![],
                available_key_approvals: vec![],
            },
            undo,
        )?;

        Ok(OperationResult::ObjectCreated(id))
    }
}

pub struct ProposalUpdateEvaluator {
    fee_paying_account: ObjectId,
    proposal: ObjectId,
    active_approvals_to_add: Vec<ObjectId>,
    owner_approvals_to_add: Vec<ObjectId>,
}

impl ProposalUpdateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::ProposalUpdate {
                fee_paying_account,
                proposal,
                active_approvals_to_add,
                owner_approvals_to_add,
            } => Ok(Self {
                fee_paying_account: *fee_paying_account,
                proposal: *proposal,
                active_approvals_to_add: active_approvals_to_add.clone(),
                owner_approvals_to_add: owner_approvals_to_add.clone(),
            }),
            _ => Err(InvalidOperation::Other("not a ProposalUpdate").into()),
        }
    }
}

impl Evaluator for ProposalUpdateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.fee_paying_account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        let proposal = db.proposals.get(self.proposal)?;
        for approver in self.active_approvals_to_add.iter().chain(&self.owner_approvals_to_add) {
            if proposal.available_active_approvals.contains(approver)
                || proposal.available_owner_approvals.contains(approver)
            {
                return Err(InvalidOperation::DuplicateApproval.into());
            }
        }
        Ok(fees.fee_for(FeeKind::ProposalUpdate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        db.proposals.modify(self.proposal, undo, |p| {
            p.available_active_approvals.extend(self.active_approvals_to_add.iter().copied());
            p.available_owner_approvals.extend(self.owner_approvals_to_add.iter().copied());
        })?;

        let proposal = db.proposals.get(self.proposal)?.clone();
        let satisfied = proposal
            .required_active_approvals
            .iter()
            .all(|a| proposal.available_active_approvals.contains(a))
            && proposal
                .required_owner_approvals
                .iter()
                .all(|a| proposal.available_owner_approvals.contains(a));

        if satisfied {
            // Execute each proposed operation in order; a failure here
            // leaves the whole ProposalUpdate's undo session to be rolled
            // back by the caller, so the proposal is not consumed.
            for op in &proposal.proposed_ops {
                crate::evaluators::evaluate_and_apply(db, undo, ctx.fees, ctx.core_asset, op, 0)?;
            }
            db.proposals.remove(self.proposal, undo)?;
        }

        Ok(OperationResult::Void)
    }
}
