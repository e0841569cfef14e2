//! ledger-chain-core: the core state machine for a delegated
//! proof-of-stake market ledger.
//!
//! # Modules
//!
//! - [`core_types`] - ids, exact-ratio `Price`/`Amount`, chain time
//! - [`crypto`] - secp256k1 recoverable ECDSA, SHA-256, public/compact key types
//! - [`error`] - the chain-wide error taxonomy
//! - [`tx`] - operations, transactions, blocks, and the wire codec
//! - [`db`] - the object database (C1) and undo journal (C2)
//! - [`authority`] - weighted-threshold signature verification (C3)
//! - [`evaluator`] - the evaluate/apply contract and fee machinery (C4)
//! - [`evaluators`] - one evaluator per operation (C5)
//! - [`market`] - limit-order matching, margin calls, forced settlement (C6)
//! - [`witness_schedule`] - near/far witness scheduling (C7)
//! - [`chain`] - block application, production, and fork switching (C8)
//! - [`subscriptions`] - object/market change notification dispatch (C9)
//! - [`block_log`] - append-only block storage
//! - [`rpc`] - in-process API surface the external RPC transport dispatches to
//! - [`config`] - chain parameters, fee schedule, genesis, and app config
//! - [`logging`] - tracing subscriber setup

pub mod core_types;

pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod tx;

pub mod db;

pub mod authority;
pub mod evaluator;
pub mod evaluators;

pub mod block_log;
pub mod chain;
pub mod market;
pub mod rpc;
pub mod subscriptions;
pub mod witness_schedule;

pub use chain::{ChainController, SkipFlags};
pub use config::{ChainParameters, FeeSchedule, GenesisConfig};
pub use core_types::{Amount, ChainTime, ObjectId, Price};
pub use db::ObjectDatabase;
pub use error::{ChainError, ChainResult};
pub use tx::{Block, Operation, SignedTransaction, Transaction};
