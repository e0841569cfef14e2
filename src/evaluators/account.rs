use crate::config::{FeeKind, FeeSchedule};
use crate::core_types::{Amount, ObjectId};
use crate::db::objects::{Account, AccountStatistics, Authority, OperationResult};
use crate::db::undo::UndoStack;
use crate::db::ObjectDatabase;
use crate::error::{ChainResult, InvalidOperation};
use crate::evaluator::Evaluator;
use crate::tx::Operation;

/// No key or sub-account may appear twice in the same authority, checked
/// on top of `is_impossible`'s threshold-reachability check (spec: new
/// authorities must be "well-formed — unique members, threshold reachable").
fn authority_members_are_unique(authority: &Authority) -> bool {
    let mut keys = std::collections::HashSet::with_capacity(authority.key_auths.len());
    if !authority.key_auths.iter().all(|(k, _)| keys.insert(*k)) {
        return false;
    }
    let mut accounts = std::collections::HashSet::with_capacity(authority.account_auths.len());
    authority.account_auths.iter().all(|(a, _)| accounts.insert(*a))
}

pub struct AccountCreateEvaluator {
    registrar: ObjectId,
    referrer: ObjectId,
    referrer_rewards_percentage: u16,
    name: String,
    owner: Authority,
    active: Authority,
}

impl AccountCreateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::AccountCreate {
                registrar,
                referrer,
                referrer_rewards_percentage,
                name,
                owner,
                active,
            } => Ok(Self {
                registrar: *registrar,
                referrer: *referrer,
                referrer_rewards_percentage: *referrer_rewards_percentage,
                name: name.clone(),
                owner: owner.clone(),
                active: active.clone(),
            }),
            _ => Err(InvalidOperation::Other("not an AccountCreate").into()),
        }
    }
}

impl Evaluator for AccountCreateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.registrar
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        if self.owner.is_impossible() || self.active.is_impossible() {
            return Err(InvalidOperation::MalformedAuthority(
                "authority weight sum below threshold",
            )
            .into());
        }
        if !authority_members_are_unique(&self.owner) || !authority_members_are_unique(&self.active) {
            return Err(InvalidOperation::MalformedAuthority("authority names a member twice").into());
        }
        db.accounts.get(self.registrar)?;
        db.accounts.get(self.referrer)?;
        Ok(fees.fee_for(FeeKind::AccountCreate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        let referrer = db.accounts.get(self.referrer)?.clone();
        let lifetime_referrer = if referrer.referrer_rewards_percentage > 0 {
            referrer.lifetime_referrer
        } else {
            referrer.id
        };

        let account_id = db.accounts.reserve_id();
        let stats_id = db.account_statistics.reserve_id();
        db.account_statistics.insert(
            stats_id,
            AccountStatistics {
                id: stats_id,
                owner: account_id,
                ..Default::default()
            },
            undo,
        )?;
        db.accounts.insert(
            account_id,
            Account {
                id: account_id,
                name: self.name.clone(),
                owner: self.owner.clone(),
                active: self.active.clone(),
                registrar: self.registrar,
                referrer: self.referrer,
                lifetime_referrer,
                referrer_rewards_percentage: self.referrer_rewards_percentage,
                statistics: stats_id,
            },
            undo,
        )?;

        Ok(OperationResult::ObjectCreated(account_id))
    }
}

pub struct AccountUpdateEvaluator {
    account: ObjectId,
    owner: Option<Authority>,
    active: Option<Authority>,
}

impl AccountUpdateEvaluator {
    pub fn from_op(op: &Operation) -> ChainResult<Self> {
        match op {
            Operation::AccountUpdate {
                account,
                owner,
                active,
            } => Ok(Self {
                account: *account,
                owner: owner.clone(),
                active: active.clone(),
            }),
            _ => Err(InvalidOperation::Other("not an AccountUpdate").into()),
        }
    }
}

impl Evaluator for AccountUpdateEvaluator {
    fn fee_payer(&self) -> ObjectId {
        self.account
    }

    fn evaluate(&self, db: &ObjectDatabase, fees: &FeeSchedule) -> ChainResult<Amount> {
        db.accounts.get(self.account)?;
        if let Some(owner) = &self.owner {
            if owner.is_impossible() {
                return Err(InvalidOperation::MalformedAuthority("owner authority impossible").into());
            }
            if !authority_members_are_unique(owner) {
                return Err(InvalidOperation::MalformedAuthority("owner authority names a member twice").into());
            }
        }
        if let Some(active) = &self.active {
            if active.is_impossible() {
                return Err(
                    InvalidOperation::MalformedAuthority("active authority impossible").into(),
                );
            }
            if !authority_members_are_unique(active) {
                return Err(InvalidOperation::MalformedAuthority("active authority names a member twice").into());
            }
        }
        Ok(fees.fee_for(FeeKind::AccountUpdate))
    }

    fn apply(
        &self,
        db: &mut ObjectDatabase,
        undo: &mut UndoStack,
        _fee: Amount,
        _ctx: &crate::evaluator::ApplyContext,
    ) -> ChainResult<OperationResult> {
        db.accounts.modify(self.account, undo, |account| {
            if let Some(owner) = &self.owner {
                account.owner = owner.clone();
            }
            if let Some(active) = &self.active {
                account.active = active.clone();
            }
        })?;
        Ok(OperationResult::Void)
    }
}
