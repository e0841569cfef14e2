//! Chain parameters, genesis configuration, and the fee schedule.
//!
//! Adapted from the teacher's `AssetConfig`/`SymbolConfig`/`TradingConfig`
//! trio (rustc_hash-keyed config loaded once at startup) but serde-driven
//! from a genesis YAML/JSON file rather than CSV, following spec §6's
//! genesis-config surface.

use crate::core_types::{Amount, ChainTime, ObjectId};
use crate::db::objects::Authority;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Per-operation-kind base fee, in core-asset units, keyed by a small
/// stable tag rather than the `Operation` enum itself so the fee schedule
/// can be serialized independently of the operation wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeeKind {
    Transfer,
    AccountCreate,
    AccountUpdate,
    AssetCreate,
    AssetUpdateFeed,
    LimitOrderCreate,
    LimitOrderCancel,
    CallOrderUpdate,
    AssetSettle,
    AssetGlobalSettle,
    BalanceClaim,
    ProposalCreate,
    ProposalUpdate,
    WitnessCreate,
    WitnessUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub base_fees: FxHashMap<FeeKind, Amount>,
    /// Charged per byte over `ChainParameters::maximum_transaction_size`'s
    /// soft baseline, matching the teacher's `calculate_fee`'s size-scaled
    /// fee component generalized from an order's notional to a
    /// transaction's serialized size.
    pub price_per_kbyte: Amount,
}

impl FeeSchedule {
    pub fn fee_for(&self, kind: FeeKind) -> Amount {
        self.base_fees.get(&kind).copied().unwrap_or(Amount::ZERO)
    }

    /// A conservative default schedule for tests and local genesis files:
    /// flat base fees, no size scaling.
    pub fn flat(base_fee: Amount) -> Self {
        use FeeKind::*;
        let kinds = [
            Transfer,
            AccountCreate,
            AccountUpdate,
            AssetCreate,
            AssetUpdateFeed,
            LimitOrderCreate,
            LimitOrderCancel,
            CallOrderUpdate,
            AssetSettle,
            AssetGlobalSettle,
            BalanceClaim,
            ProposalCreate,
            ProposalUpdate,
            WitnessCreate,
            WitnessUpdate,
        ];
        let mut base_fees = FxHashMap::default();
        for kind in kinds {
            base_fees.insert(kind, base_fee);
        }
        Self {
            base_fees,
            price_per_kbyte: Amount::ZERO,
        }
    }
}

/// Parameters that the maintenance pass may update (witness/committee
/// size, block interval, tx size cap) but that aren't part of genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParameters {
    pub maximum_transaction_size: u32,
    pub block_interval: ChainTime,
    pub maintenance_interval: ChainTime,
    pub maintenance_skip_slots: u8,
    pub maximum_authority_depth: u8,
    pub fee_schedule: FeeSchedule,
}

/// A single genesis balance claim seed, keyed by the historical address
/// that will be allowed to claim it via `Operation::BalanceClaim`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub owner_key: crate::crypto::PublicKey,
    pub amount: Amount,
    pub asset_id: ObjectId,
}

/// A genesis account seed: enough to bootstrap the witness/committee
/// accounts and any pre-funded accounts before block 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub name: String,
    pub owner: Authority,
    pub active: Authority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub chain_id: [u8; 32],
    pub initial_timestamp: ChainTime,
    pub parameters: ChainParameters,
    pub core_asset_symbol: String,
    pub core_asset_precision: u8,
    pub initial_accounts: Vec<GenesisAccount>,
    pub initial_balances: Vec<GenesisBalance>,
    pub initial_witness_count: u16,
}

/// The core asset is always the first asset this crate's genesis builder
/// reserves, so a `GenesisBalance.asset_id` can reference it before it
/// exists. Mirrors `witness_schedule::default_witness_id`'s fixed-instance
/// convention.
pub fn genesis_core_asset_id() -> ObjectId {
    use crate::core_types::{protocol_types, Space};
    ObjectId::new(Space::Protocol, protocol_types::ASSET, 0)
}

/// Node process configuration (spec §6 CLI/config surface): witness
/// identities, data directory, and logging, loaded once at startup.
/// Adapted from the teacher's `AppConfig` (log dir/file/rotation/level).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_dir: String,
    pub log_dir: String,
    pub log_file: String,
    /// "hourly" | "daily" | anything else means never-rotate.
    pub rotation: String,
    pub log_level: String,
    pub use_json: bool,
    pub enable_tracing: bool,
    pub enable_stale_production: bool,
    pub witnesses: Vec<WitnessCredential>,
}

/// One witness identity this node can produce blocks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WitnessCredential {
    pub witness_id: ObjectId,
    /// WIF or legacy-native encoded private key (spec §6).
    pub private_key_wif: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            log_dir: "logs".into(),
            log_file: "ledger-chain-node.log".into(),
            rotation: "daily".into(),
            log_level: "info".into(),
            use_json: false,
            enable_tracing: true,
            enable_stale_production: false,
            witnesses: Vec::new(),
        }
    }
}
