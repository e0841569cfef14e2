//! Operation evaluators (C5): one module per `Operation` variant,
//! implementing `crate::evaluator::Evaluator`'s evaluate/apply contract.

pub mod account;
pub mod asset;
pub mod balance_claim;
pub mod call_order;
pub mod force_settle;
pub mod limit_order;
pub mod proposal;
pub mod transfer;
pub mod witness_delegate;

use crate::config::FeeSchedule;
use crate::core_types::ObjectId;
use crate::db::objects::{OperationHistory, OperationResult};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::ChainResult;
use crate::evaluator::Evaluator;
use crate::tx::Operation;

/// Runs the full evaluate-then-apply contract for one operation, within
/// the caller's already-open undo session. `apply` runs first; only once it
/// succeeds is the fee deducted and distributed by `evaluator::pay_fee`
/// (spec §4.4: "fee payment is performed after apply succeeds"), after
/// which an `OperationHistory` row is recorded and linked into every
/// clearly-involved account's stats (spec §3).
///
/// `trx_in_block` is this operation's transaction's position within the
/// block being applied (`0` for a call outside normal block production,
/// e.g. a proposal's unlocked operations, or a direct evaluator test).
pub fn evaluate_and_apply(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    fees: &FeeSchedule,
    core_asset: crate::core_types::ObjectId,
    op: &Operation,
    trx_in_block: u16,
) -> ChainResult<OperationResult> {
    let payer = crate::evaluator::fee_payer(db, op);
    let ctx = crate::evaluator::ApplyContext { fees, core_asset };

    let (fee, result) = match op {
        Operation::Transfer { .. } => {
            let e = transfer::TransferEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::AccountCreate { .. } => {
            let e = account::AccountCreateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::AccountUpdate { .. } => {
            let e = account::AccountUpdateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::AssetCreate { .. } => {
            let e = asset::AssetCreateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::AssetUpdateFeed { .. } => {
            let e = asset::AssetUpdateFeedEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::LimitOrderCreate { .. } => {
            let e = limit_order::LimitOrderCreateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::LimitOrderCancel { .. } => {
            let e = limit_order::LimitOrderCancelEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::CallOrderUpdate { .. } => {
            let e = call_order::CallOrderUpdateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::AssetSettle { .. } => {
            let e = force_settle::AssetSettleEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::AssetGlobalSettle { .. } => {
            let e = force_settle::AssetGlobalSettleEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::BalanceClaim { .. } => {
            let e = balance_claim::BalanceClaimEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::ProposalCreate { .. } => {
            let e = proposal::ProposalCreateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::ProposalUpdate { .. } => {
            let e = proposal::ProposalUpdateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::WitnessCreate { .. } => {
            let e = witness_delegate::WitnessCreateEvaluator::from_op(op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
        Operation::WitnessUpdate { .. } => {
            let e = witness_delegate::WitnessUpdateEvaluator::from_op(db, op)?;
            let fee = e.evaluate(db, fees)?;
            let result = e.apply(db, undo, fee, &ctx)?;
            (fee, result)
        }
    };

    let is_transfer = matches!(op, Operation::Transfer { .. });
    crate::evaluator::pay_fee(db, undo, payer, core_asset, fee, is_transfer)?;
    record_operation(db, undo, op, &result, trx_in_block, payer)?;

    Ok(result)
}

/// Inserts the `OperationHistory` row for an applied operation and bumps
/// `total_ops`/`most_recent_op` on the fee payer and every other
/// clearly-referenced account (spec §3).
fn record_operation(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    op: &Operation,
    result: &OperationResult,
    trx_in_block: u16,
    payer: ObjectId,
) -> ChainResult<()> {
    let block_num = db
        .dynamic_global_properties
        .iter()
        .next()
        .map(|(_, d)| d.head_block_number + 1)
        .unwrap_or(0);

    let op_id = db.operation_history.reserve_id();
    db.operation_history.insert(
        op_id,
        OperationHistory {
            id: op_id,
            op: op.clone(),
            result: result.clone(),
            block_num,
            trx_in_block,
        },
        undo,
    )?;

    touch_account_stats(db, undo, payer, op_id)?;
    for account in referenced_accounts(op) {
        if account != payer {
            touch_account_stats(db, undo, account, op_id)?;
        }
    }
    Ok(())
}

fn touch_account_stats(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    account_id: ObjectId,
    op_id: ObjectId,
) -> ChainResult<()> {
    let Some(stats_id) = db.accounts.try_get(account_id).map(|a| a.statistics) else {
        return Ok(());
    };
    db.account_statistics.modify(stats_id, undo, |s| {
        s.total_ops += 1;
        s.most_recent_op = Some(op_id);
    })
}

/// Accounts beyond the fee payer that an operation clearly names as the
/// other party to it — e.g. a `Transfer`'s recipient. Fields that merely
/// authorize the operation (witnesses on a multisig, approvers on a
/// proposal) aren't included; those aren't "referenced" in the spec's
/// sense, just authorizing signers.
fn referenced_accounts(op: &Operation) -> Vec<ObjectId> {
    use Operation::*;
    match op {
        Transfer { to, .. } => vec![*to],
        AccountCreate {
            registrar, referrer, ..
        } => vec![*registrar, *referrer],
        WitnessCreate { witness_account, .. } => vec![*witness_account],
        _ => Vec::new(),
    }
}
