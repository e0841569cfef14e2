//! In-process RPC surface (spec §6).
//!
//! The JSON-over-WebSocket transport itself — framing, auth, connection
//! management — is an explicit external-collaborator concern and is not
//! implemented here. What lives in this module is the thing a transport
//! crate would import: every method name the surface exposes verbatim,
//! and a read/write API object that turns each into a query against the
//! object database, the chain controller, or the subscription dispatcher.
//! `get_market_history`/`get_market_history_buckets` are deliberately
//! thin — the market-history analytics plugin that would back them is
//! its own out-of-scope collaborator.

use crate::chain::ChainController;
use crate::core_types::ObjectId;
use crate::error::{ChainResult, StateError};
use crate::subscriptions::{MarketCallback, MarketKey, ObjectCallback, SubscriptionDispatcher, SubscriptionHandle};
use crate::tx::{Operation, SignedTransaction};
use serde_json::{json, Value};

/// Every method name the RPC surface exposes, verbatim from spec §6, kept
/// as a plain list so a transport layer can validate/dispatch without
/// this crate knowing anything about JSON-RPC framing.
pub const METHOD_NAMES: &[&str] = &[
    "get_objects",
    "get_block",
    "get_block_header",
    "get_transaction",
    "get_global_properties",
    "get_dynamic_global_properties",
    "get_accounts",
    "get_assets",
    "lookup_account_names",
    "lookup_accounts",
    "get_account_balances",
    "get_limit_orders",
    "get_call_orders",
    "get_settle_orders",
    "list_assets",
    "get_witnesses",
    "lookup_witness_accounts",
    "get_delegates",
    "lookup_delegate_accounts",
    "subscribe_to_objects",
    "unsubscribe_from_objects",
    "subscribe_to_market",
    "unsubscribe_from_market",
    "get_transaction_hex",
    "get_proposed_transactions",
    "get_account_references",
    "get_key_references",
    "get_margin_positions",
    "get_balance_objects",
    "get_account_history",
    "get_market_history",
    "get_market_history_buckets",
    "broadcast_transaction",
    "broadcast_transaction_with_callback",
    "login",
];

/// Whether an operation names `account` anywhere in its fields — backs
/// `get_account_history`/`get_account_references` without a dedicated
/// per-account index.
fn operation_mentions_account(op: &Operation, account: ObjectId) -> bool {
    match op {
        Operation::Transfer { from, to, .. } => *from == account || *to == account,
        Operation::AccountCreate {
            registrar, referrer, ..
        } => *registrar == account || *referrer == account,
        Operation::AccountUpdate { account: a, .. } => *a == account,
        Operation::AssetCreate { issuer, .. } => *issuer == account,
        Operation::AssetUpdateFeed { publisher, .. } => *publisher == account,
        Operation::LimitOrderCreate { seller, .. } => *seller == account,
        Operation::LimitOrderCancel {
            fee_paying_account, ..
        } => *fee_paying_account == account,
        Operation::CallOrderUpdate { funding_account, .. } => *funding_account == account,
        Operation::AssetSettle { account: a, .. } => *a == account,
        Operation::AssetGlobalSettle { issuer, .. } => *issuer == account,
        Operation::BalanceClaim {
            deposit_to_account, ..
        } => *deposit_to_account == account,
        Operation::ProposalCreate {
            fee_paying_account, ..
        } => *fee_paying_account == account,
        Operation::ProposalUpdate {
            fee_paying_account, ..
        } => *fee_paying_account == account,
        Operation::WitnessCreate { witness_account, .. } => *witness_account == account,
        Operation::WitnessUpdate { .. } => false,
    }
}

/// Borrows the chain controller and subscription dispatcher for the
/// duration of one RPC call. A transport crate constructs one of these
/// per request (or holds it behind its own connection-scoped lock) and
/// dispatches on `METHOD_NAMES`.
pub struct RpcApi<'a> {
    pub chain: &'a mut ChainController,
    pub subscriptions: &'a mut SubscriptionDispatcher,
}

impl<'a> RpcApi<'a> {
    pub fn get_objects(&self, ids: &[ObjectId]) -> Vec<Option<Value>> {
        ids.iter().map(|id| self.chain.db.object_snapshot(*id)).collect()
    }

    pub fn get_global_properties(&self) -> ChainResult<Value> {
        let (id, gp) = self
            .chain
            .db
            .global_properties
            .iter()
            .next()
            .ok_or(StateError::IndexCorrupt("no global properties object"))?;
        Ok(json!({ "id": id, "properties": gp }))
    }

    pub fn get_dynamic_global_properties(&self) -> ChainResult<Value> {
        let (id, dgp) = self
            .chain
            .db
            .dynamic_global_properties
            .iter()
            .next()
            .ok_or(StateError::IndexCorrupt("no dynamic global properties object"))?;
        Ok(json!({ "id": id, "properties": dgp }))
    }

    pub fn get_accounts(&self, ids: &[ObjectId]) -> Vec<Option<Value>> {
        ids.iter()
            .map(|id| self.chain.db.accounts.try_get(*id).and_then(|a| serde_json::to_value(a).ok()))
            .collect()
    }

    pub fn get_assets(&self, ids: &[ObjectId]) -> Vec<Option<Value>> {
        ids.iter()
            .map(|id| self.chain.db.assets.try_get(*id).and_then(|a| serde_json::to_value(a).ok()))
            .collect()
    }

    pub fn lookup_account_names(&self, names: &[String]) -> Vec<Option<Value>> {
        names
            .iter()
            .map(|name| {
                self.chain
                    .db
                    .accounts
                    .iter()
                    .find(|(_, a)| &a.name == name)
                    .and_then(|(_, a)| serde_json::to_value(a).ok())
            })
            .collect()
    }

    pub fn lookup_accounts(&self, lower_bound_name: &str, limit: usize) -> Vec<(String, ObjectId)> {
        let mut matches: Vec<(String, ObjectId)> = self
            .chain
            .db
            .accounts
            .iter()
            .filter(|(_, a)| a.name.as_str() >= lower_bound_name)
            .map(|(id, a)| (a.name.clone(), *id))
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches.truncate(limit);
        matches
    }

    pub fn get_account_balances(&self, account: ObjectId) -> Vec<Value> {
        self.chain
            .db
            .balances
            .iter()
            .filter(|(_, b)| b.owner == account)
            .filter_map(|(_, b)| serde_json::to_value(b).ok())
            .collect()
    }

    /// Alias kept distinct from `get_account_balances` per spec §6's
    /// method list, even though both query the same `Balance` table.
    pub fn get_balance_objects(&self, account: ObjectId) -> Vec<Value> {
        self.get_account_balances(account)
    }

    pub fn get_limit_orders(&self, base: ObjectId, quote: ObjectId, limit: usize) -> Vec<Value> {
        self.chain
            .db
            .limit_orders_for_asset(base)
            .into_iter()
            .filter(|o| o.sell_price.quote.asset_id == quote)
            .take(limit)
            .filter_map(|o| serde_json::to_value(o).ok())
            .collect()
    }

    pub fn get_call_orders(&self, asset_id: ObjectId, limit: usize) -> Vec<Value> {
        self.chain
            .db
            .call_orders_for_asset(asset_id)
            .into_iter()
            .take(limit)
            .filter_map(|o| serde_json::to_value(o).ok())
            .collect()
    }

    /// Call orders funded by `account`, across every market-issued asset
    /// — what a wallet polls to show a user's open margin positions.
    pub fn get_margin_positions(&self, account: ObjectId) -> Vec<Value> {
        self.chain
            .db
            .call_orders
            .iter()
            .filter(|(_, o)| o.borrower == account)
            .filter_map(|(_, o)| serde_json::to_value(o).ok())
            .collect()
    }

    pub fn get_settle_orders(&self, asset_id: ObjectId) -> Vec<Value> {
        self.chain
            .db
            .force_settlements
            .iter()
            .filter(|(_, s)| s.asset_id == asset_id)
            .filter_map(|(_, s)| serde_json::to_value(s).ok())
            .collect()
    }

    pub fn list_assets(&self, lower_bound_symbol: &str, limit: usize) -> Vec<Value> {
        let mut assets: Vec<_> = self
            .chain
            .db
            .assets
            .iter()
            .filter(|(_, a)| a.symbol.as_str() >= lower_bound_symbol)
            .collect();
        assets.sort_by(|a, b| a.1.symbol.cmp(&b.1.symbol));
        assets
            .into_iter()
            .take(limit)
            .filter_map(|(_, a)| serde_json::to_value(a).ok())
            .collect()
    }

    pub fn get_witnesses(&self, ids: &[ObjectId]) -> Vec<Option<Value>> {
        ids.iter()
            .map(|id| self.chain.db.witnesses.try_get(*id).and_then(|w| serde_json::to_value(w).ok()))
            .collect()
    }

    pub fn lookup_witness_accounts(&self, accounts: &[ObjectId]) -> Vec<Option<Value>> {
        accounts
            .iter()
            .map(|account| {
                self.chain
                    .db
                    .witnesses
                    .iter()
                    .find(|(_, w)| w.witness_account == *account)
                    .and_then(|(_, w)| serde_json::to_value(w).ok())
            })
            .collect()
    }

    pub fn get_delegates(&self, ids: &[ObjectId]) -> Vec<Option<Value>> {
        ids.iter()
            .map(|id| self.chain.db.delegates.try_get(*id).and_then(|d| serde_json::to_value(d).ok()))
            .collect()
    }

    pub fn lookup_delegate_accounts(&self, accounts: &[ObjectId]) -> Vec<Option<Value>> {
        accounts
            .iter()
            .map(|account| {
                self.chain
                    .db
                    .delegates
                    .iter()
                    .find(|(_, d)| d.delegate_account == *account)
                    .and_then(|(_, d)| serde_json::to_value(d).ok())
            })
            .collect()
    }

    pub fn get_proposed_transactions(&self, account: ObjectId) -> Vec<Value> {
        self.chain
            .db
            .proposals
            .iter()
            .filter(|(_, p)| {
                p.required_active_approvals.contains(&account) || p.required_owner_approvals.contains(&account)
            })
            .filter_map(|(_, p)| serde_json::to_value(p).ok())
            .collect()
    }

    /// Every proposal and piece of operation history that names `account`,
    /// most recent first, capped at `limit` — there being no dedicated
    /// per-account index, this scans `operation_history` directly.
    pub fn get_account_history(&self, account: ObjectId, limit: usize) -> Vec<Value> {
        let mut entries: Vec<_> = self
            .chain
            .db
            .operation_history
            .iter()
            .filter(|(_, h)| operation_mentions_account(&h.op, account))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(a.0));
        entries
            .into_iter()
            .take(limit)
            .filter_map(|(_, h)| serde_json::to_value(h).ok())
            .collect()
    }

    /// Accounts whose owner/active authority names `key` directly.
    pub fn get_key_references(&self, key: &crate::crypto::PublicKey) -> Vec<ObjectId> {
        self.chain
            .db
            .accounts
            .iter()
            .filter(|(_, a)| {
                a.owner.key_auths.iter().any(|(k, _)| k == key)
                    || a.active.key_auths.iter().any(|(k, _)| k == key)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Accounts whose owner/active authority names `account` as a
    /// sub-authority.
    pub fn get_account_references(&self, account: ObjectId) -> Vec<ObjectId> {
        self.chain
            .db
            .accounts
            .iter()
            .filter(|(_, a)| {
                a.owner.account_auths.iter().any(|(id, _)| *id == account)
                    || a.active.account_auths.iter().any(|(id, _)| *id == account)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Deliberately unimplemented: the market-history analytics plugin
    /// this would read from is its own out-of-scope collaborator (spec
    /// §1 Non-goals).
    pub fn get_market_history(&self, _base: ObjectId, _quote: ObjectId) -> Vec<Value> {
        Vec::new()
    }

    pub fn get_market_history_buckets(&self, _base: ObjectId, _quote: ObjectId, _bucket_seconds: u32) -> Vec<Value> {
        Vec::new()
    }

    pub fn get_transaction_hex(&self, tx: &SignedTransaction) -> ChainResult<String> {
        let bytes = bincode::serialize(tx).map_err(|_| StateError::IndexCorrupt("transaction does not serialize"))?;
        Ok(hex::encode(bytes))
    }

    pub fn subscribe_to_objects(&mut self, id: ObjectId, callback: ObjectCallback) -> SubscriptionHandle {
        self.subscriptions.subscribe_object(id, callback)
    }

    pub fn unsubscribe_from_objects(&mut self, id: ObjectId, handle: SubscriptionHandle) {
        self.subscriptions.unsubscribe_object(id, handle)
    }

    pub fn subscribe_to_market(&mut self, key: MarketKey, callback: MarketCallback) -> SubscriptionHandle {
        self.subscriptions.subscribe_market(key, callback)
    }

    pub fn unsubscribe_from_market(&mut self, key: MarketKey, handle: SubscriptionHandle) {
        self.subscriptions.unsubscribe_market(key, handle)
    }

    pub fn broadcast_transaction(&mut self, tx: SignedTransaction) {
        self.chain.queue_transaction(tx);
    }

    /// Identical to `broadcast_transaction` in this in-process API: the
    /// "callback" half (notifying the caller once the transaction lands
    /// in a block) belongs to the transport layer, which is what owns a
    /// connection to call back on.
    pub fn broadcast_transaction_with_callback(&mut self, tx: SignedTransaction) {
        self.broadcast_transaction(tx);
    }

    /// No authentication is modeled at the core layer; a transport that
    /// wants API key gating implements it in front of this API.
    pub fn login(&self, _user: &str, _password: &str) -> bool {
        true
    }
}
