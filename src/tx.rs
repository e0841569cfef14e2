//! Operations, transactions, and the wire codec (spec §6).
//!
//! Transactions sign over a digest of their serialized body plus the
//! chain id, TaPoS fields pin them to a recent block, and signatures are
//! compact recoverable secp256k1 (crate::crypto). The transaction id is a
//! SHA-256 digest truncated to 20 bytes; the spec is explicit that this
//! truncation is deliberate and an implementer should not "upgrade" it to
//! a full 32-byte digest, since downstream TaPoS references are sized
//! against the 20-byte id.

use crate::core_types::{Amount, ChainTime, ObjectId, Price};
use crate::crypto::{self, CompactSignature, PublicKey};
use crate::db::objects::{Authority, BitassetOptions};
use serde::{Deserialize, Serialize};

/// A 20-byte truncated SHA-256 digest, used both as the transaction id and
/// as the block id (spec §6). Deliberately short; see module docs.
pub type TxId = [u8; 20];

pub fn truncate_digest(full: [u8; 32]) -> TxId {
    let mut out = [0u8; 20];
    out.copy_from_slice(&full[..20]);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Transfer {
        from: ObjectId,
        to: ObjectId,
        amount: Amount,
        asset_id: ObjectId,
    },
    AccountCreate {
        registrar: ObjectId,
        referrer: ObjectId,
        referrer_rewards_percentage: u16,
        name: String,
        owner: Authority,
        active: Authority,
    },
    AccountUpdate {
        account: ObjectId,
        owner: Option<Authority>,
        active: Option<Authority>,
    },
    AssetCreate {
        issuer: ObjectId,
        symbol: String,
        precision: u8,
        is_market_issued: bool,
        market_fee_percent: u16,
        max_market_fee: Amount,
        core_exchange_rate: Price,
        bitasset_opts: Option<BitassetOptions>,
    },
    AssetUpdateFeed {
        publisher: ObjectId,
        asset_id: ObjectId,
        feed: crate::db::objects::PriceFeed,
    },
    LimitOrderCreate {
        seller: ObjectId,
        amount_to_sell: Amount,
        sell_price: Price,
        expiration: ChainTime,
        fill_or_kill: bool,
    },
    LimitOrderCancel {
        fee_paying_account: ObjectId,
        order: ObjectId,
    },
    CallOrderUpdate {
        funding_account: ObjectId,
        delta_collateral: i64,
        delta_debt: i64,
        asset_id: ObjectId,
        target_collateral_ratio: Option<u16>,
    },
    AssetSettle {
        account: ObjectId,
        amount: Amount,
        asset_id: ObjectId,
    },
    AssetGlobalSettle {
        issuer: ObjectId,
        asset_id: ObjectId,
        settle_price: Price,
    },
    BalanceClaim {
        deposit_to_account: ObjectId,
        balance_owner_key: PublicKey,
        total_claimed: Amount,
        asset_id: ObjectId,
    },
    ProposalCreate {
        fee_paying_account: ObjectId,
        expiration_time: ChainTime,
        proposed_ops: Vec<Operation>,
    },
    ProposalUpdate {
        fee_paying_account: ObjectId,
        proposal: ObjectId,
        active_approvals_to_add: Vec<ObjectId>,
        owner_approvals_to_add: Vec<ObjectId>,
    },
    WitnessCreate {
        witness_account: ObjectId,
        signing_key: PublicKey,
    },
    WitnessUpdate {
        witness: ObjectId,
        new_signing_key: Option<PublicKey>,
    },
}

/// An unsigned transaction body (spec §6). `ref_block_num`/`ref_block_prefix`
/// are the TaPoS fields pinning this transaction to a recent block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub expiration: ChainTime,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Digest signed over: chain id plus the bincode-serialized body. Wire
    /// stability matters here — changing field order changes every
    /// signature, so this is the one place the bincode encoding of
    /// `Transaction` is relied upon directly.
    pub fn signing_digest(&self, chain_id: &[u8; 32]) -> [u8; 32] {
        let mut buf = chain_id.to_vec();
        buf.extend(bincode::serialize(self).expect("Transaction always serializes"));
        crypto::sha256(&buf)
    }

    pub fn id(&self, chain_id: &[u8; 32]) -> TxId {
        truncate_digest(self.signing_digest(chain_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signatures: Vec<CompactSignature>,
}

impl SignedTransaction {
    pub fn id(&self, chain_id: &[u8; 32]) -> TxId {
        self.transaction.id(chain_id)
    }
}

/// The header fields that get hashed into the block id and signed by the
/// witness (spec §6). `previous_secret`/`next_secret_hash` carry the
/// secret-reveal chain that lets `ChainController::apply_block` verify the
/// block's witness actually holds the committed secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous: TxId,
    pub timestamp: ChainTime,
    pub witness: ObjectId,
    pub transaction_merkle_root: TxId,
    pub previous_secret: TxId,
    pub next_secret_hash: TxId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub extensions: Vec<Vec<u8>>,
    pub transactions: Vec<SignedTransaction>,
    pub witness_signature: CompactSignature,
}

impl Block {
    /// SHA-256 over the header and transaction list, excluding the
    /// witness's own signature (which signs this digest).
    pub fn signing_digest(&self) -> [u8; 32] {
        let mut buf = bincode::serialize(&self.header).expect("BlockHeader always serializes");
        buf.extend(bincode::serialize(&self.transactions).expect("transactions always serialize"));
        crypto::sha256(&buf)
    }

    pub fn id(&self) -> TxId {
        truncate_digest(self.signing_digest())
    }

    /// Merkle root over transaction ids, following the teacher's pairwise
    /// SHA-256 folding convention (adapted from `wal_v2.rs`'s checksum
    /// chaining) rather than a full Merkle tree library, since the spec
    /// only requires a single committed root, never individual inclusion
    /// proofs.
    pub fn compute_merkle_root(tx_ids: &[TxId]) -> TxId {
        if tx_ids.is_empty() {
            return [0u8; 20];
        }
        let mut level: Vec<TxId> = tx_ids.to_vec();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            for pair in level.chunks(2) {
                let mut buf = pair[0].to_vec();
                buf.extend(pair.get(1).unwrap_or(&pair[0]));
                next.push(truncate_digest(crypto::sha256(&buf)));
            }
            level = next;
        }
        level[0]
    }
}

/// Encode a value with a little-endian varint length prefix, the wire
/// convention spec §6 uses for lists and top-level messages.
pub fn encode_varint_prefixed<T: Serialize>(value: &T) -> bincode::Result<Vec<u8>> {
    let body = bincode::serialize(value)?;
    let mut out = encode_varint(body.len() as u64);
    out.extend(body);
    Ok(out)
}

pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

pub fn decode_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        if i >= 9 {
            return None;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{protocol_types, Space};

    fn asset(n: u64) -> ObjectId {
        ObjectId::new(Space::Protocol, protocol_types::ASSET, n)
    }

    fn account(n: u64) -> ObjectId {
        ObjectId::new(Space::Protocol, protocol_types::ACCOUNT, n)
    }

    #[test]
    fn tx_id_is_20_bytes_and_deterministic() {
        let tx = Transaction {
            ref_block_num: 1,
            ref_block_prefix: 42,
            expiration: 1000,
            operations: vec![Operation::Transfer {
                from: account(1),
                to: account(2),
                amount: Amount(500),
                asset_id: asset(0),
            }],
        };
        let chain_id = [7u8; 32];
        let id1 = tx.id(&chain_id);
        let id2 = tx.id(&chain_id);
        assert_eq!(id1.len(), 20);
        assert_eq!(id1, id2);
    }

    #[test]
    fn different_chain_id_changes_digest() {
        let tx = Transaction {
            ref_block_num: 1,
            ref_block_prefix: 42,
            expiration: 1000,
            operations: vec![],
        };
        let id1 = tx.id(&[1u8; 32]);
        let id2 = tx.id(&[2u8; 32]);
        assert_ne!(id1, id2);
    }

    #[test]
    fn varint_roundtrips() {
        for n in [0u64, 1, 127, 128, 300, 16384, u64::MAX] {
            let encoded = encode_varint(n);
            let (decoded, len) = decode_varint(&encoded).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(len, encoded.len());
        }
    }
}
