//! Error taxonomy for the chain core.
//!
//! Mirrors the abstract kinds of the design: each operation evaluator,
//! the authority verifier, and the chain controller all fail into one of
//! these variants. `StateError` and `UndoError` are fatal — the node
//! aborts rather than continue against a store it can no longer trust.

use crate::core_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("missing active authority for account {0}")]
    MissingActive(ObjectId),
    #[error("missing owner authority for account {0}")]
    MissingOwner(ObjectId),
    #[error("authority recursion depth exceeded (max {max})")]
    DepthExceeded { max: u8 },
    #[error("duplicate signature in transaction")]
    DuplicateSignature,
    #[error("irrelevant signature present: key not used by any required authority")]
    IrrelevantSignature,
    #[error("signature does not recover to a valid public key")]
    BadSignature,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("block previous {got} does not match head {expected}")]
    WrongPrevious { expected: String, got: String },
    #[error("block timestamp {0} is not slot-aligned")]
    MisalignedTimestamp(u32),
    #[error("block witness {got} is not the scheduled witness {expected}")]
    WrongWitness { expected: ObjectId, got: ObjectId },
    #[error("block signature does not verify against the witness's signing key")]
    BadBlockSignature,
    #[error("secret reveal does not hash to the witness's committed secret")]
    BadSecretReveal,
    #[error("transaction references a block outside the TaPoS window")]
    StaleTapos,
    #[error("transaction has expired")]
    ExpiredTransaction,
    #[error("merkle root mismatch")]
    BadMerkleRoot,
    #[error("global properties have no active witnesses")]
    NoActiveWitnesses,
    #[error("slot number must be >= 1")]
    InvalidSlot,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidOperation {
    #[error("insufficient balance: need {need}, have {have}")]
    InsufficientBalance { need: u64, have: u64 },
    #[error("account {0} is blacklisted for asset {1}")]
    Blacklisted(ObjectId, ObjectId),
    #[error("market for asset {0} is closed")]
    ClosedMarket(ObjectId),
    #[error("call order would be under-collateralized at creation")]
    UnderCollateralized,
    #[error("balance claimed too often: cooldown not elapsed")]
    BalanceClaimedTooOften,
    #[error("authority is malformed: {0}")]
    MalformedAuthority(&'static str),
    #[error("proposal already has this approval")]
    DuplicateApproval,
    #[error("operation precondition violated: {0}")]
    Other(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("object {0} not found")]
    NotFound(ObjectId),
    #[error("index invariant violated: {0}")]
    IndexCorrupt(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("operation would trigger a black swan and black swans are disallowed here")]
    WouldBlackSwan,
    #[error("prediction market requires delta_collateral == delta_debt")]
    PredictionMarketMismatch,
    #[error("asset is already globally settled")]
    AlreadyGloballySettled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("fee pool for asset {0} cannot cover the requested fee")]
    FeePoolExhausted(ObjectId),
    #[error("object count quota exceeded for space/type")]
    QuotaExceeded,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UndoError {
    #[error("attempted to pop beyond the retained undo window")]
    BeyondWindow,
    #[error("undo session stack is empty")]
    EmptyStack,
}

/// Top-level error, carrying a captured context string for the RPC caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("{0}")]
    Authority(#[from] AuthorityError),
    #[error("{0}")]
    Consensus(#[from] ConsensusError),
    #[error("{0}")]
    Invalid(#[from] InvalidOperation),
    #[error("fatal state error: {0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Market(#[from] MarketError),
    #[error("{0}")]
    Resource(#[from] ResourceError),
    #[error("fatal undo error: {0}")]
    Undo(#[from] UndoError),
}

impl ChainError {
    /// `StateError`/`UndoError` indicate a corrupted store; the caller must abort
    /// rather than keep applying blocks.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::State(_) | ChainError::Undo(_))
    }

    pub fn with_context(self, context: impl Into<String>) -> ChainErrorWithContext {
        ChainErrorWithContext {
            error: self,
            context: context.into(),
        }
    }
}

/// A `ChainError` plus a captured context string, as surfaced to RPC callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}: {context}")]
pub struct ChainErrorWithContext {
    pub error: ChainError,
    pub context: String,
}

pub type ChainResult<T> = Result<T, ChainError>;
