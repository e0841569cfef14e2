//! Shared fixture for the integration tests: a from-scratch `ObjectDatabase`
//! plus `ChainController` wired up the way `bin/node.rs::build_genesis` does
//! it, minus the config-file plumbing. Every test builds its own `Fixture`
//! so tests never share mutable state.

use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use std::collections::HashMap;

use ledger_chain_core::core_types::{AssetAmount, ChainTime, ObjectId};
use ledger_chain_core::crypto::{self, PublicKey};
use ledger_chain_core::db::objects::{
    Account, AccountStatistics, Asset, AssetDynamicData, Authority, Balance,
    DynamicGlobalProperties, GlobalProperties, OperationResult, Witness,
};
use ledger_chain_core::db::undo::UndoStack;
use ledger_chain_core::evaluators;
use ledger_chain_core::tx::{truncate_digest, Operation, SignedTransaction, Transaction, TxId};
use ledger_chain_core::{
    Amount, Block, ChainController, ChainParameters, ChainResult, FeeSchedule, ObjectDatabase,
    Price, SkipFlags,
};

pub const CHAIN_ID: [u8; 32] = [7u8; 32];
pub const BLOCK_INTERVAL: ChainTime = 3;
pub const INITIAL_TIMESTAMP: ChainTime = 1_700_000_000;
pub const FLAT_FEE: u64 = 10;
pub const INITIAL_BALANCE: u64 = 1_000_000;
pub const UNDO_WINDOW: usize = 64;

/// Deterministic per-witness, per-round secret, so a test never needs its
/// own RNG: `commit_of(secret_at(w, n))` is the commitment a witness's
/// `n`-th produced block must reveal the preimage of.
fn secret_at(witness_id: ObjectId, seq: u64) -> TxId {
    let mut buf = Vec::with_capacity(32 + 8 + 8);
    buf.extend_from_slice(&CHAIN_ID);
    buf.extend_from_slice(&witness_id.instance().to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    truncate_digest(crypto::sha256(&buf))
}

fn commit_of(secret: TxId) -> TxId {
    truncate_digest(crypto::sha256(&secret))
}

fn single_key_authority(key: &SigningKey) -> (Authority, PublicKey) {
    let pk = PublicKey::from_verifying_key(key.verifying_key());
    (
        Authority {
            weight_threshold: 1,
            key_auths: vec![(pk, 1)],
            account_auths: vec![],
        },
        pk,
    )
}

pub struct Fixture {
    pub chain: ChainController,
    pub core_asset: ObjectId,
    pub accounts: Vec<ObjectId>,
    pub account_keys: Vec<SigningKey>,
    pub witnesses: Vec<ObjectId>,
    witness_keys: HashMap<ObjectId, SigningKey>,
    secret_seq: HashMap<ObjectId, u64>,
}

impl Fixture {
    /// `n_accounts` funded accounts (each holding `INITIAL_BALANCE` of the
    /// core asset), the first `n_witnesses` of which also hold a witness
    /// seat signing with the same key as their account.
    pub fn build(n_accounts: usize, n_witnesses: usize) -> Self {
        assert!(n_witnesses <= n_accounts);
        let mut db = ObjectDatabase::new();
        let mut undo = UndoStack::new();
        undo.push_session();

        let core_asset = db.assets.reserve_id();
        let core_dyn = db.asset_dynamic_data.reserve_id();
        db.asset_dynamic_data
            .insert(
                core_dyn,
                AssetDynamicData {
                    id: core_dyn,
                    current_supply: Amount(INITIAL_BALANCE * n_accounts as u64),
                    accumulated_fees: Amount::ZERO,
                    fee_pool: Amount::ZERO,
                },
                &mut undo,
            )
            .unwrap();
        let identity_price = Price::new(
            AssetAmount::new(1, core_asset),
            AssetAmount::new(1, core_asset),
        );
        db.assets
            .insert(
                core_asset,
                Asset {
                    id: core_asset,
                    symbol: "CORE".into(),
                    precision: 5,
                    issuer: core_asset,
                    dynamic_data: core_dyn,
                    bitasset_data: None,
                    is_market_issued: false,
                    market_fee_percent: 0,
                    max_market_fee: Amount::ZERO,
                    core_exchange_rate: identity_price,
                },
                &mut undo,
            )
            .unwrap();

        let mut accounts = Vec::new();
        let mut account_keys = Vec::new();
        for i in 0..n_accounts {
            let key = SigningKey::random(&mut OsRng);
            let (authority, _pk) = single_key_authority(&key);
            let account_id = db.accounts.reserve_id();
            let stats_id = db.account_statistics.reserve_id();
            db.account_statistics
                .insert(
                    stats_id,
                    AccountStatistics {
                        id: stats_id,
                        owner: account_id,
                        ..Default::default()
                    },
                    &mut undo,
                )
                .unwrap();
            db.accounts
                .insert(
                    account_id,
                    Account {
                        id: account_id,
                        name: format!("account{i}"),
                        owner: authority.clone(),
                        active: authority,
                        registrar: account_id,
                        referrer: account_id,
                        lifetime_referrer: account_id,
                        referrer_rewards_percentage: 0,
                        statistics: stats_id,
                    },
                    &mut undo,
                )
                .unwrap();

            let balance_id = db.balances.reserve_id();
            db.balances
                .insert(
                    balance_id,
                    Balance {
                        id: balance_id,
                        owner: account_id,
                        asset_id: core_asset,
                        amount: Amount(INITIAL_BALANCE),
                    },
                    &mut undo,
                )
                .unwrap();

            accounts.push(account_id);
            account_keys.push(key);
        }

        let mut witnesses = Vec::new();
        let mut witness_keys = HashMap::new();
        for i in 0..n_witnesses {
            let key = account_keys[i].clone();
            let pk = PublicKey::from_verifying_key(key.verifying_key());
            let witness_id = db.witnesses.reserve_id();
            let commitment = commit_of(secret_at(witness_id, 0));
            db.witnesses
                .insert(
                    witness_id,
                    Witness {
                        id: witness_id,
                        witness_account: accounts[i],
                        signing_key: pk,
                        last_confirmed_block_num: 0,
                        total_votes: Amount::ZERO,
                        total_missed: 0,
                        next_secret_hash: commitment,
                    },
                    &mut undo,
                )
                .unwrap();
            witnesses.push(witness_id);
            witness_keys.insert(witness_id, key);
        }

        let parameters = ChainParameters {
            maximum_transaction_size: 1_000_000,
            block_interval: BLOCK_INTERVAL,
            maintenance_interval: 86_400 * 1_000,
            maintenance_skip_slots: 0,
            maximum_authority_depth: 6,
            fee_schedule: FeeSchedule::flat(Amount(FLAT_FEE)),
        };

        let gp_id = db.global_properties.reserve_id();
        db.global_properties
            .insert(
                gp_id,
                GlobalProperties {
                    id: gp_id,
                    active_witnesses: witnesses.clone(),
                    active_delegates: Vec::new(),
                    maximum_transaction_size: parameters.maximum_transaction_size,
                    block_interval: parameters.block_interval,
                    maintenance_interval: parameters.maintenance_interval,
                    maintenance_skip_slots: parameters.maintenance_skip_slots,
                },
                &mut undo,
            )
            .unwrap();

        let dgp_id = db.dynamic_global_properties.reserve_id();
        let current_witness = witnesses
            .first()
            .copied()
            .unwrap_or_else(|| core_asset);
        db.dynamic_global_properties
            .insert(
                dgp_id,
                DynamicGlobalProperties {
                    id: dgp_id,
                    head_block_number: 0,
                    head_block_id: [0u8; 20],
                    time: INITIAL_TIMESTAMP,
                    current_witness,
                    next_maintenance_time: INITIAL_TIMESTAMP + parameters.maintenance_interval,
                    random: CHAIN_ID,
                    recently_missed_count: 0,
                },
                &mut undo,
            )
            .unwrap();

        let schedule_id = db.witness_schedule.reserve_id();
        let schedule = ledger_chain_core::witness_schedule::genesis_schedule(&CHAIN_ID, &witnesses);
        debug_assert_eq!(schedule_id, schedule.id);
        db.witness_schedule
            .insert(schedule_id, schedule, &mut undo)
            .unwrap();

        undo.commit_session().unwrap();

        let chain = ChainController::new(db, CHAIN_ID, parameters, core_asset, UNDO_WINDOW);

        Fixture {
            chain,
            core_asset,
            accounts,
            account_keys,
            witnesses,
            witness_keys,
            secret_seq: HashMap::new(),
        }
    }

    /// Builds and signs a transaction with `ref_block_num = 0` (no TaPoS
    /// pin) and the given expiration, which may be `0` for "never expires".
    pub fn sign(
        &self,
        ops: Vec<Operation>,
        signers: &[&SigningKey],
        expiration: ChainTime,
    ) -> SignedTransaction {
        let trx = Transaction {
            ref_block_num: 0,
            ref_block_prefix: 0,
            expiration,
            operations: ops,
        };
        let digest = trx.signing_digest(&self.chain.chain_id);
        let signatures = signers
            .iter()
            .map(|k| crypto::sign_recoverable(k, &digest))
            .collect();
        SignedTransaction {
            transaction: trx,
            signatures,
        }
    }

    pub fn head_time(&self) -> ChainTime {
        self.chain
            .db
            .dynamic_global_properties
            .iter()
            .next()
            .unwrap()
            .1
            .time
    }

    pub fn head_block_number(&self) -> u32 {
        self.chain
            .db
            .dynamic_global_properties
            .iter()
            .next()
            .unwrap()
            .1
            .head_block_number
    }

    fn next_secret_pair(&mut self, witness_id: ObjectId) -> (TxId, TxId) {
        let seq = *self.secret_seq.get(&witness_id).unwrap_or(&0);
        let revealed = secret_at(witness_id, seq);
        let next = secret_at(witness_id, seq + 1);
        self.secret_seq.insert(witness_id, seq + 1);
        (revealed, next)
    }

    /// Produces and applies the next block, letting `get_scheduled_witness`
    /// pick who signs it.
    pub fn produce_block(&mut self) -> ChainResult<Block> {
        self.produce_block_with_skip(SkipFlags::empty())
    }

    pub fn produce_block_with_skip(&mut self, skip: SkipFlags) -> ChainResult<Block> {
        let (witness_id, _) =
            ledger_chain_core::witness_schedule::get_scheduled_witness(&self.chain.db, 1)?;
        let key = self
            .witness_keys
            .get(&witness_id)
            .expect("scheduled witness has no known signing key in this fixture")
            .clone();
        let (revealed, next) = self.next_secret_pair(witness_id);
        self.chain.produce_block(witness_id, &key, revealed, next, skip)
    }

    /// The signing key behind a witness seat created by `build`.
    pub fn witness_key(&self, witness_id: ObjectId) -> &SigningKey {
        self.witness_keys
            .get(&witness_id)
            .expect("unknown witness id")
    }

    pub fn balance_of(&self, owner: ObjectId, asset_id: ObjectId) -> Amount {
        self.chain
            .db
            .balances
            .iter()
            .find(|(_, b)| b.owner == owner && b.asset_id == asset_id)
            .map(|(_, b)| b.amount)
            .unwrap_or(Amount::ZERO)
    }

    /// Directly evaluates and applies one operation against the fixture's
    /// db/undo, bypassing block production and signature checks — for
    /// exercising an evaluator's validation in isolation. Wraps the call in
    /// its own undo session so a rejected operation leaves no trace.
    pub fn eval(&mut self, op: &Operation) -> ChainResult<OperationResult> {
        self.chain.undo.push_session();
        let result = evaluators::evaluate_and_apply(
            &mut self.chain.db,
            &mut self.chain.undo,
            &self.chain.parameters.fee_schedule,
            self.core_asset,
            op,
            0,
        );
        match result {
            Ok(r) => {
                self.chain.undo.commit_session()?;
                Ok(r)
            }
            Err(e) => {
                let _ = self.chain.undo.undo_session(&mut self.chain.db);
                Err(e)
            }
        }
    }
}
