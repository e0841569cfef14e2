use crate::config::FeeSchedule;
use crate::core_types::{time, Amount, ChainTime, ObjectId};
use crate::crypto::{AddressEncoding, PublicKey};
use crate::db::objects::OperationResult;
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

/// Genesis balances are addressed by a historical pubkey-derived address
/// rather than an `ObjectId`, since they predate the account that will
/// eventually claim them. `BalanceClaim` must accept whichever of the
/// supported historical encodings (`crypto::AddressEncoding`) the balance
/// was originally deposited under.
pub struct BalanceClaimEvaluator {
    deposit_to_account: ObjectId,
    balance_owner_key: PublicKey,
    total_claimed: Amount,
    asset_id: ObjectId,
}

impl BalanceClaimEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::BalanceClaim {
                deposit_to_account,
                balance_owner_key,
                total_claimed,
                asset_id,
            } => Ok(Self {
                deposit_to_account: *deposit_to_account,
                balance_owner_key: *balance_owner_key,
                total_claimed: *total_claimed,
                asset_id: *asset_id,
            }),
            _ => Err(InvalidOperation::Other("not a BalanceClaim").into()),
        }
    }

    fn find_genesis_balance(&self, db: &ObjectDatabase) -> ChainResult<ObjectId> {
        let candidates = [AddressEncoding::Current, AddressEncoding::Legacy];
        for encoding in candidates {
            let address = self.balance_owner_key.to_address(encoding);
            let owner_id = genesis_balance_object_id(&address);
            if let Some(balance) = db.balances.try_get(owner_id) {
                if balance.asset_id == self.asset_id && balance.amount.0 >= self.total_claimed.0 {
                    return Ok(owner_id);
                }
            }
        }
        Err(InvalidOperation::Other("no matching unclaimed genesis balance").into())
    }

    fn current_time(db: &ObjectDatabase) -> ChainTime {
        db.dynamic_global_properties
            .iter()
            .next()
            .map(|(_, p)| p.time)
            .unwrap_or(0)
    }
}

/// Minimum time an account must wait between successful balance claims.
pub const CLAIM_COOLDOWN: ChainTime = time::SECONDS_PER_DAY;

/// Deterministic mapping from a derived address to the `ObjectId` a
/// genesis balance for it was seeded under. Genesis seeding
/// (`bin/node.rs`) reserves balance ids in address order so this stays
/// stable across runs.
pub fn genesis_balance_object_id(address: &crate::crypto::Address) -> ObjectId {
    let instance = u64::from_be_bytes(address.hash[..8].try_into().unwrap()) & ((1u64 << 48) - 1);
    ObjectId::new(
        crate::core_types::Space::Protocol,
        crate::core_types::protocol_types::BALANCE,
        instance,
    )
}

impl Evaluator for BalanceClaimEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.deposit_to_account
    }

    fn evaluate(&self, db: &ObjectDatabase, _fees: &FeeSchedule) -> ChainResult<Amount> {
        let account = db.accounts.get(self.deposit_to_account)?;
        let stats = db.account_statistics.get(account.statistics)?;
        let now = Self::current_time(db);
        if now.saturating_sub(stats.last_balance_claim) < CLAIM_COOLDOWN
            && stats.last_balance_claim != 0
        {
            return Err(InvalidOperation::BalanceClaimedTooOften.into());
        }
        self.find_genesis_balance(db)?;
        // Claiming a genesis balance is always free (spec): the account has
        // no on-chain presence to pay a fee out of until the claim lands.
        Ok(Amount::ZERO)
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let genesis_balance_id = self.find_genesis_balance(db)?;
        db.balances.modify(genesis_balance_id, undo, |b| {
            b.amount = Amount(b.amount.0 - self.total_claimed.0);
        })?;

        let now = Self::current_time(db);
        let stats_id = db.accounts.get(self.deposit_to_account)?.statistics;
        db.account_statistics.modify(stats_id, undo, |s| {
            s.last_balance_claim = now;
        })?;

        let existing = db
            .balances
            .iter()
            .find(|(_, b)| b.owner == self.deposit_to_account && b.asset_id == self.asset_id)
            .map(|(id, _)| *id);

        match existing {
            Some(id) => {
                db.balances.modify(id, undo, |b| {
                    b.amount = b.amount.checked_add(self.total_claimed).unwrap_or(b.amount);
                })?;
            }
            None => {
                let id = db.balances.reserve_id();
                db.balances.insert(
                    id,
                    crate::db::objects::Balance {
                        id,
                        owner: self.deposit_to_account,
                        asset_id: self.asset_id,
                        amount: self.total_claimed,
                    },
                    undo,
                )?;
            }
        }

        Ok(OperationResult::Void)
    }
}
