//! Evaluator framework (C4): the two-phase evaluate/apply dispatch, and
//! fee computation/payment shared by every operation evaluator.
//!
//! Grounded in the teacher's `fee.rs` (`calculate_fee`/
//! `calculate_fee_with_discount`, `FEE_PRECISION`) for the fee-schedule
//! arithmetic, generalized here to also handle paying fees in a
//! non-core asset (converted via `core_exchange_rate`) and splitting the
//! resulting cashback into an account's referral chain per spec §4.4.

use crate::config::FeeSchedule;
use crate::core_types::{Amount, ObjectId};
use crate::db::objects::Account;
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, ResourceError};
use crate::tx::Operation;

/// Every operation evaluator implements this two-phase contract: `evaluate`
/// checks preconditions and returns the fee that will be charged without
/// mutating anything; `apply` performs the mutation, assuming `evaluate`
/// already passed. The chain controller always calls both in sequence
/// within the same undo session so a failed `apply` never leaves partial
/// state (spec §4.5).
pub trait Evaluator {
    /// The account whose balance pays this operation's fee.
    fn fee_payer(&self) -> ObjectId;

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount>;

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        fee: Amount,
        ctx: &ApplyContext,
    ) -> ChainResult<crate::db::objects::OperationResult>;
}

/// Ambient information `apply` needs beyond its own operation's fields:
/// the live fee schedule and core asset, needed by `ProposalUpdate` to
/// recursively evaluate-and-apply the operations it unlocks.
pub struct ApplyContext<'a> {
    pub fees: &'a FeeSchedule,
    pub core_asset: ObjectId,
}

/// Parts-per-10000 precision used by `FeeSchedule` percentages and the
/// cashback split, matching the teacher's `FEE_PRECISION` convention in
/// `fee.rs` (there 1_000_000ths; here 10_000ths to match spec §4.4's
/// percentage fields, which are themselves parts-per-10000).
pub const FEE_PRECISION: u32 = 10_000;

pub fn percent_of(amount: Amount, percent: u16) -> Amount {
    Amount(((amount.0 as u128 * percent as u128) / FEE_PRECISION as u128) as u64)
}

/// A referral cashback cascade never walks more hops than this before the
/// remainder is left with the network, mirroring `authority::
/// MAX_AUTHORITY_DEPTH`'s guard against a cyclical chain spinning forever.
const MAX_REFERRAL_DEPTH: u8 = 6;

/// Core-asset unit scale, matching the core asset's own precision (5
/// decimals) in genesis; the bulk discount thresholds below are expressed
/// in whole core units at this scale.
pub const BLOCKCHAIN_PRECISION: u64 = 100_000;

/// Lifetime fee-paid threshold past which an account's next
/// `BULK_DISCOUNT_TRANSFERS` transfers earn a flat cashback bonus on top of
/// ordinary referral cashback (spec §4.4 "Bulk discount").
pub const BULK_DISCOUNT_THRESHOLD_MIN: Amount = Amount(1_000 * BLOCKCHAIN_PRECISION);
/// A second lifetime-fees threshold past which the bonus escalates.
pub const BULK_DISCOUNT_THRESHOLD_MAX: Amount = Amount(10_000 * BLOCKCHAIN_PRECISION);
pub const BULK_DISCOUNT_TRANSFERS: u32 = 10;
const BULK_DISCOUNT_BONUS: Amount = Amount(8 * BLOCKCHAIN_PRECISION);
const BULK_DISCOUNT_BONUS_ESCALATED: Amount = Amount(9 * BLOCKCHAIN_PRECISION);

/// Deduct `fee` from `payer`'s core-asset balance (or a market-issued
/// asset's fee pool conversion, handled by the caller beforehand), apply
/// the bulk-discount bonus if `payer` has one active, route the cashback
/// share up the referral chain, and record the remainder as accumulated
/// network fees.
///
/// `is_transfer` scopes the bulk discount to `Transfer` operations only,
/// per spec §4.4 ("its next 10 transfers") — other operation kinds never
/// arm or consume the counter. Any leftover after cashback (the network's
/// share) accrues to the core asset's dynamic data `accumulated_fees`,
/// exactly mirroring the teacher's `calculate_fee_with_discount`'s
/// "discount reduces payer cost, not network revenue" invariant
/// generalized to referral cashback.
pub fn pay_fee(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    payer: ObjectId,
    core_asset: ObjectId,
    fee: Amount,
    is_transfer: bool,
) -> ChainResult<()> {
    if fee.is_zero() {
        return Ok(());
    }

    let payer_balance_id = find_balance(db, payer, core_asset)?;
    db.balances.modify(payer_balance_id, undo, |b| {
        b.amount = Amount(b.amount.0.saturating_sub(fee.0));
    })?;

    let stats_id = db.accounts.get(payer)?.statistics;
    let before = db.account_statistics.get(stats_id)?.clone();
    let lifetime_after = before
        .lifetime_fees_paid
        .checked_add(fee)
        .unwrap_or(before.lifetime_fees_paid);

    let mut remaining_bonus_transfers = before.bulk_discount_transfers_remaining;
    let mut bonus = Amount::ZERO;
    if is_transfer {
        if before.lifetime_fees_paid.0 < BULK_DISCOUNT_THRESHOLD_MIN.0
            && lifetime_after.0 >= BULK_DISCOUNT_THRESHOLD_MIN.0
        {
            remaining_bonus_transfers = BULK_DISCOUNT_TRANSFERS;
        }
        if remaining_bonus_transfers > 0 {
            bonus = if lifetime_after.0 >= BULK_DISCOUNT_THRESHOLD_MAX.0 {
                BULK_DISCOUNT_BONUS_ESCALATED
            } else {
                BULK_DISCOUNT_BONUS
            };
            remaining_bonus_transfers -= 1;
        }
    }

    db.account_statistics.modify(stats_id, undo, |s| {
        s.lifetime_fees_paid = lifetime_after;
        s.bulk_discount_transfers_remaining = remaining_bonus_transfers;
        if !bonus.is_zero() {
            s.pending_fees = s.pending_fees.checked_add(bonus).unwrap_or(s.pending_fees);
        }
    })?;

    distribute_cashback(db, undo, payer, fee)?;

    let core_dyn = db.assets.get(core_asset)?.dynamic_data;
    db.asset_dynamic_data.modify(core_dyn, undo, |d| {
        d.accumulated_fees = d.accumulated_fees.checked_add(fee).unwrap_or(d.accumulated_fees);
    })?;

    Ok(())
}

/// Splits `fee` into a vested and vesting cashback share up `payer`'s full
/// referrer chain, per spec §4.4: not just the immediate referrer, but
/// that referrer's own referrer, and so on, each hop splitting off
/// `referrer_rewards_percentage` of what's left until the chain reaches a
/// self-referred ("lifetime") account, the remainder is exhausted, or
/// `MAX_REFERRAL_DEPTH` is hit. Whatever isn't claimed by the chain stays
/// with the network (handled by the caller adding it to
/// `accumulated_fees`). At each hop, the share is vested immediately if
/// that hop's own referrer is itself self-referred, and otherwise queued
/// as vesting cashback — the same lifetime-vs-vesting split the single-hop
/// version applied once, now applied at every hop.
fn distribute_cashback(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    payer: ObjectId,
    fee: Amount,
) -> ChainResult<()> {
    let mut current = payer;
    let mut remaining = fee;
    let mut depth = 0u8;

    while !remaining.is_zero() && depth < MAX_REFERRAL_DEPTH {
        let account = db.accounts.get(current)?.clone();
        if account.referrer == account.id {
            break; // self-referred: the rest stays with the network
        }
        depth += 1;

        let share = percent_of(remaining, account.referrer_rewards_percentage);
        if share.is_zero() {
            current = account.referrer;
            continue;
        }

        let referrer_acc = db.accounts.get(account.referrer)?.clone();
        let (vested, vesting) = if referrer_acc.referrer == referrer_acc.id {
            (share, Amount::ZERO)
        } else {
            (Amount::ZERO, share)
        };
        credit_pending_fees(db, undo, account.referrer, vested, vesting)?;

        remaining = Amount(remaining.0 - share.0);
        current = account.referrer;
    }

    Ok(())
}

fn credit_pending_fees(
    db: &mut ObjectDatabase,
    undo: &mut UndoStack,
    account_id: ObjectId,
    vested: Amount,
    vesting: Amount,
) -> ChainResult<()> {
    let stats_id = db.accounts.get(account_id)?.statistics;
    db.account_statistics.modify(stats_id, undo, |s| {
        s.pending_vested_fees = s.pending_vested_fees.checked_add(vested).unwrap_or(s.pending_vested_fees);
        s.pending_fees = s.pending_fees.checked_add(vesting).unwrap_or(s.pending_fees);
    })
}

fn find_balance(db: &ObjectDatabase, owner: ObjectId, asset_id: ObjectId) -> ChainResult<ObjectId> {
    db.balances
        .iter()
        .find(|(_, b)| b.owner == owner && b.asset_id == asset_id)
        .map(|(id, _)| *id)
        .ok_or_else(|| ResourceError::FeePoolExhausted(asset_id).into())
}

/// Dispatches an `Operation` to the evaluator that owns it. Each arm just
/// constructs that operation's evaluator struct (in `crate::evaluators`)
/// and hands it to the generic two-phase driver in `evaluate_and_apply`.
///
/// `WitnessUpdate` only carries a witness id, not an account id, so its
/// fee payer is resolved through `db`; every other variant names its
/// payer account directly.
pub fn fee_payer(db: &ObjectDatabase, op: &Operation) -> ObjectId {
    use Operation::*;
    match op {
        Transfer { from, .. } => *from,
        AccountCreate { registrar, .. } => *registrar,
        AccountUpdate { account, .. } => *account,
        AssetCreate { issuer, .. } => *issuer,
        AssetUpdateFeed { publisher, .. } => *publisher,
        LimitOrderCreate { seller, .. } => *seller,
        LimitOrderCancel {
            fee_paying_account, ..
        } => *fee_paying_account,
        CallOrderUpdate {
            funding_account, ..
        } => *funding_account,
        AssetSettle { account, .. } => *account,
        AssetGlobalSettle { issuer, .. } => *issuer,
        BalanceClaim {
            deposit_to_account, ..
        } => *deposit_to_account,
        ProposalCreate {
            fee_paying_account, ..
        } => *fee_paying_account,
        ProposalUpdate {
            fee_paying_account, ..
        } => *fee_paying_account,
        WitnessCreate { witness_account, .. } => *witness_account,
        WitnessUpdate { witness, .. } => db
            .witnesses
            .try_get(*witness)
            .map(|w| w.witness_account)
            .unwrap_or(*witness),
    }
}

#[allow(dead_code)]
fn _assert_account_shape(_: &Account) {}
