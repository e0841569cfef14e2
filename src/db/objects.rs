//! Entity object types (spec §3).
//!
//! Every struct here is stored behind an `ObjectId` in the `ObjectDatabase`
//! (see `db::mod`) and is what the undo journal snapshots on modify/remove.
//! Protocol-space objects are authored directly by operations; the
//! implementation-space ones (`AccountStatistics`, `AssetDynamicData`,
//! `AssetBitassetData`, `GlobalProperties`, `DynamicGlobalProperties`,
//! `WitnessSchedule`) are derived/maintained by the chain itself.

use crate::core_types::{Amount, ChainTime, ObjectId, Price};
use crate::crypto::PublicKey;
use crate::tx::TxId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A weighted-threshold authority: satisfied when the sum of weights of
/// present signatures/sub-authorities reaches `weight_threshold` (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    pub key_auths: Vec<(PublicKey, u16)>,
    pub account_auths: Vec<(ObjectId, u16)>,
}

impl Authority {
    pub fn is_impossible(&self) -> bool {
        let total: u32 = self
            .key_auths
            .iter()
            .map(|(_, w)| *w as u32)
            .chain(self.account_auths.iter().map(|(_, w)| *w as u32))
            .sum();
        total < self.weight_threshold
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: ObjectId,
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
    pub registrar: ObjectId,
    pub referrer: ObjectId,
    pub lifetime_referrer: ObjectId,
    /// Fraction of this account's paid network fees routed to the referrer,
    /// in parts-per-10000 (spec §4.4 cashback split).
    pub referrer_rewards_percentage: u16,
    pub statistics: ObjectId, // -> AccountStatistics
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountStatistics {
    pub id: ObjectId,
    pub owner: ObjectId,
    pub total_ops: u64,
    /// `OperationHistory` id of the most recent operation evaluated for
    /// this account, either as fee payer or as another clearly-referenced
    /// party (e.g. a `Transfer`'s `to`).
    pub most_recent_op: Option<ObjectId>,
    /// Cashback accrued but not yet vested, split per spec §4.4.
    pub pending_fees: Amount,
    pub pending_vested_fees: Amount,
    pub lifetime_fees_paid: Amount,
    /// Core asset currently posted as this account's own call order
    /// collateral (spec §3 "total core locked in orders").
    pub total_core_in_orders: Amount,
    /// Transfers left at the bulk-discount cashback bonus rate, counting
    /// down from `BULK_DISCOUNT_TRANSFERS` once `lifetime_fees_paid`
    /// crosses `BULK_DISCOUNT_THRESHOLD_MIN` (spec §4.4 "Bulk discount").
    pub bulk_discount_transfers_remaining: u32,
    /// Chain time of this account's most recent successful `BalanceClaim`,
    /// enforcing the per-account claim cooldown (spec §4.5).
    pub last_balance_claim: ChainTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: ObjectId,
    pub symbol: String,
    pub precision: u8,
    pub issuer: ObjectId,
    pub dynamic_data: ObjectId,          // -> AssetDynamicData
    pub bitasset_data: Option<ObjectId>, // -> AssetBitassetData, market-issued only
    pub is_market_issued: bool,
    pub market_fee_percent: u16,
    pub max_market_fee: Amount,
    /// Asset used to pay fees in place of this one, converted at
    /// `core_exchange_rate` (spec §4.4).
    pub core_exchange_rate: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetDynamicData {
    pub id: ObjectId,
    pub current_supply: Amount,
    pub accumulated_fees: Amount,
    pub fee_pool: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetBitassetData {
    pub id: ObjectId,
    pub asset_id: ObjectId,
    pub feeds: FxHashMap<ObjectId, (ChainTime, PriceFeed)>,
    pub current_feed: PriceFeed,
    pub current_feed_publication_time: ChainTime,
    pub options: BitassetOptions,
    pub is_prediction_market: bool,
    pub settlement_price: Price,
    pub settlement_fund: Amount,
    /// `Some` once global settlement has been triggered; no further call
    /// order updates or new orders are accepted (spec §4.6).
    pub globally_settled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeed {
    pub settlement_price: Price,
    pub maintenance_collateral_ratio: u16,
    pub maximum_short_squeeze_ratio: u16,
    pub core_exchange_rate: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitassetOptions {
    pub feed_lifetime: ChainTime,
    pub minimum_feeds: u8,
    pub force_settlement_delay: ChainTime,
    pub force_settlement_offset_percent: u16,
    /// Caps forced settlement volume per maintenance period (spec §4.6).
    pub maximum_force_settlement_volume: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOrder {
    pub id: ObjectId,
    pub seller: ObjectId,
    pub for_sale: Amount,
    /// Sell price: `amount_to_receive / for_sale`.
    pub sell_price: Price,
    pub expiration: ChainTime,
    pub deferred_fee: Amount,
}

impl LimitOrder {
    pub fn amount_to_receive(&self) -> Amount {
        self.sell_price
            .convert(self.for_sale)
            .unwrap_or(Amount::ZERO)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOrder {
    pub id: ObjectId,
    pub borrower: ObjectId,
    pub collateral: Amount,
    pub debt: Amount,
    pub call_price: Price,
    pub target_collateral_ratio: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceSettlement {
    pub id: ObjectId,
    pub owner: ObjectId,
    pub asset_id: ObjectId,
    pub balance: Amount,
    pub settlement_date: ChainTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub id: ObjectId,
    pub owner: ObjectId,
    pub asset_id: ObjectId,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub id: ObjectId,
    pub witness_account: ObjectId,
    pub signing_key: PublicKey,
    pub last_confirmed_block_num: u32,
    pub total_votes: Amount,
    pub total_missed: u64,
    /// Truncated SHA-256 of the next secret to be revealed (spec §4.8
    /// secret chain), using the same 20-byte truncation as `TxId`.
    pub next_secret_hash: TxId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub id: ObjectId,
    pub delegate_account: ObjectId,
    pub total_votes: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ObjectId,
    pub expiration_time: ChainTime,
    pub proposed_ops: Vec<crate::tx::Operation>,
    pub required_active_approvals: Vec<ObjectId>,
    pub required_owner_approvals: Vec<ObjectId>,
    pub available_active_approvals: Vec<ObjectId>,
    pub available_owner_approvals: Vec<ObjectId>,
    pub available_key_approvals: Vec<PublicKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalProperties {
    pub id: ObjectId,
    pub active_witnesses: Vec<ObjectId>,
    pub active_delegates: Vec<ObjectId>,
    pub maximum_transaction_size: u32,
    pub block_interval: ChainTime,
    pub maintenance_interval: ChainTime,
    pub maintenance_skip_slots: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGlobalProperties {
    pub id: ObjectId,
    pub head_block_number: u32,
    pub head_block_id: [u8; 20],
    pub time: ChainTime,
    pub current_witness: ObjectId,
    pub next_maintenance_time: ChainTime,
    /// Rolling entropy hash, updated by each secret reveal, that seeds the
    /// near/far witness schedulers (spec §4.7).
    pub random: [u8; 32],
    pub recently_missed_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessSchedule {
    pub id: ObjectId,
    pub current_shuffled_witnesses: Vec<ObjectId>,
    /// Near scheduler's token queue: the witness id scheduled for each of
    /// the next `|active_witnesses|` slots, front of the queue is the
    /// slot about to be produced (spec §4.7).
    pub near_future_slots: Vec<ObjectId>,
    /// Total slots consumed since genesis, the PRNG counter input.
    pub slots_since_genesis: u64,
    /// Rolling RNG seed, rolled forward from `DynamicGlobalProperties.random`
    /// each time `produce_schedule` reports an `emit_turn`.
    pub rng_seed: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHistory {
    pub id: ObjectId,
    pub op: crate::tx::Operation,
    pub result: OperationResult,
    pub block_num: u32,
    pub trx_in_block: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationResult {
    Void,
    ObjectCreated(ObjectId),
    Balance(Amount),
}
