//! Authority satisfaction (C3).
//!
//! An operation requires the active (or owner) authority of one or more
//! accounts. Each `Authority` is a weighted threshold over keys and
//! nested account authorities; satisfying it means finding a subset of
//! available signing keys whose weights, after resolving nested accounts
//! recursively, sum to at least the threshold. Recursion is bounded
//! (spec §4.3) so a cycle of accounts voting for each other can't be used
//! to manufacture authority for free or to hang verification.

use crate::core_types::ObjectId;
use crate::crypto::{self, CompactSignature, PublicKey};
use crate::db::objects::Authority;
use crate::db::ObjectDatabase;
use crate::error::{AuthorityError, ChainResult};
use std::collections::HashSet;

/// The maximum depth of nested account authorities resolved while checking
/// a single top-level authority (spec §4.3).
pub const MAX_AUTHORITY_DEPTH: u8 = 6;

/// Recovers and caches the signing keys for a transaction's signatures so
/// repeated authority checks (active + owner for several operations in the
/// same transaction) don't re-run elliptic-curve recovery.
pub struct SignatureCache {
    digest: [u8; 32],
    keys: Vec<PublicKey>,
    used: Vec<bool>,
}

impl SignatureCache {
    pub fn new(digest: [u8; 32], signatures: &[CompactSignature]) -> ChainResult<Self> {
        let mut keys = Vec::with_capacity(signatures.len());
        for sig in signatures {
            let key = crypto::recover_public_key(sig, &digest)
                .map_err(|_| AuthorityError::BadSignature)?;
            keys.push(key);
        }
        if has_duplicate(&keys) {
            return Err(AuthorityError::DuplicateSignature.into());
        }
        let used = vec![false; keys.len()];
        Ok(Self { digest, keys, used })
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    fn contains(&mut self, key: &PublicKey) -> bool {
        if let Some(idx) = self.keys.iter().position(|k| k == key) {
            self.used[idx] = true;
            true
        } else {
            false
        }
    }

    /// Every recovered key must participate in satisfying some required
    /// authority; a signature that never matched anything is rejected
    /// (spec §4.3 "irrelevant signature").
    pub fn check_all_used(&self) -> ChainResult<()> {
        if self.used.iter().all(|u| *u) {
            Ok(())
        } else {
            Err(AuthorityError::IrrelevantSignature.into())
        }
    }
}

fn has_duplicate(keys: &[PublicKey]) -> bool {
    let mut seen = HashSet::new();
    !keys.iter().all(|k| seen.insert(*k))
}

/// Checks whether `authority`, resolved against `cache`'s recovered keys
/// and `db`'s nested account authorities, is satisfied.
pub fn is_authority_satisfied(
    db: &ObjectDatabase,
    cache: &mut SignatureCache,
    authority: &Authority,
    depth: u8,
) -> ChainResult<bool> {
    if depth > MAX_AUTHORITY_DEPTH {
        return Err(AuthorityError::DepthExceeded {
            max: MAX_AUTHORITY_DEPTH,
        }
        .into());
    }

    let mut total_weight: u32 = 0;

    for (key, weight) in &authority.key_auths {
        if cache.contains(key) {
            total_weight += *weight as u32;
        }
    }

    for (account_id, weight) in &authority.account_auths {
        let account = db.accounts.get(*account_id)?;
        if is_authority_satisfied(db, cache, &account.active, depth + 1)? {
            total_weight += *weight as u32;
        }
    }

    Ok(total_weight >= authority.weight_threshold)
}

/// Verifies that `account_id`'s active authority is satisfied by the
/// signatures in `cache`, consuming nested account auths as needed.
pub fn verify_active(
    db: &ObjectDatabase,
    cache: &mut SignatureCache,
    account_id: ObjectId,
) -> ChainResult<()> {
    let account = db.accounts.get(account_id)?;
    if is_authority_satisfied(db, cache, &account.active, 0)? {
        Ok(())
    } else {
        Err(AuthorityError::MissingActive(account_id).into())
    }
}

/// Verifies that `account_id`'s owner authority is satisfied — required
/// for owner-level operations like key/authority replacement.
pub fn verify_owner(
    db: &ObjectDatabase,
    cache: &mut SignatureCache,
    account_id: ObjectId,
) -> ChainResult<()> {
    let account = db.accounts.get(account_id)?;
    if is_authority_satisfied(db, cache, &account.owner, 0)? {
        Ok(())
    } else {
        Err(AuthorityError::MissingOwner(account_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::objects::{Account, AccountStatistics};
    use k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    fn account_with_key(
        db: &mut ObjectDatabase,
        undo: &mut crate::db::undo::UndoStack,
        key: PublicKey,
        threshold: u32,
    ) -> ObjectId {
        let id = db.accounts.reserve_id();
        let stats_id = db.account_statistics.reserve_id();
        db.account_statistics
            .insert(
                stats_id,
                AccountStatistics {
                    id: stats_id,
                    owner: id,
                    ..Default::default()
                },
                undo,
            )
            .unwrap();
        let authority = Authority {
            weight_threshold: threshold,
            key_auths: vec![(key, 1)],
            account_auths: vec![],
        };
        db.accounts
            .insert(
                id,
                Account {
                    id,
                    name: "alice".into(),
                    owner: authority.clone(),
                    active: authority,
                    registrar: id,
                    referrer: id,
                    lifetime_referrer: id,
                    referrer_rewards_percentage: 0,
                    statistics: stats_id,
                },
                undo,
            )
            .unwrap();
        id
    }

    #[test]
    fn single_key_authority_satisfied_by_matching_signature() {
        let mut db = ObjectDatabase::new();
        let mut undo = crate::db::undo::UndoStack::new();
        undo.push_session();

        let signing_key = SigningKey::random(&mut OsRng);
        let public = PublicKey::from_verifying_key(signing_key.verifying_key());
        let account_id = account_with_key(&mut db, &mut undo, public, 1);

        let digest = crypto::sha256(b"a transaction");
        let sig = crypto::sign_recoverable(&signing_key, &digest);
        let mut cache = SignatureCache::new(digest, &[sig]).unwrap();

        verify_active(&db, &mut cache, account_id).unwrap();
        cache.check_all_used().unwrap();
    }

    #[test]
    fn missing_signature_fails_authority() {
        let mut db = ObjectDatabase::new();
        let mut undo = crate::db::undo::UndoStack::new();
        undo.push_session();

        let signing_key = SigningKey::random(&mut OsRng);
        let public = PublicKey::from_verifying_key(signing_key.verifying_key());
        let account_id = account_with_key(&mut db, &mut undo, public, 1);

        let digest = crypto::sha256(b"a transaction");
        let mut cache = SignatureCache::new(digest, &[]).unwrap();

        let err = verify_active(&db, &mut cache, account_id).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ChainError::Authority(AuthorityError::MissingActive(_))
        ));
    }

    #[test]
    fn nested_account_authority_recurses() {
        let mut db = ObjectDatabase::new();
        let mut undo = crate::db::undo::UndoStack::new();
        undo.push_session();

        let signing_key = SigningKey::random(&mut OsRng);
        let public = PublicKey::from_verifying_key(signing_key.verifying_key());
        let leaf = account_with_key(&mut db, &mut undo, public, 1);

        let parent_id = db.accounts.reserve_id();
        let stats_id = db.account_statistics.reserve_id();
        db.account_statistics
            .insert(
                stats_id,
                AccountStatistics {
                    id: stats_id,
                    owner: parent_id,
                    ..Default::default()
                },
                &mut undo,
            )
            .unwrap();
        let nested_authority = Authority {
            weight_threshold: 1,
            key_auths: vec![],
            account_auths: vec![(leaf, 1)],
        };
        db.accounts
            .insert(
                parent_id,
                Account {
                    id: parent_id,
                    name: "multisig".into(),
                    owner: nested_authority.clone(),
                    active: nested_authority,
                    registrar: parent_id,
                    referrer: parent_id,
                    lifetime_referrer: parent_id,
                    referrer_rewards_percentage: 0,
                    statistics: stats_id,
                },
                &mut undo,
            )
            .unwrap();

        let digest = crypto::sha256(b"a transaction");
        let sig = crypto::sign_recoverable(&signing_key, &digest);
        let mut cache = SignatureCache::new(digest, &[sig]).unwrap();
        verify_active(&db, &mut cache, parent_id).unwrap();
    }
}
