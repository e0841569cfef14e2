//! Signature recovery, digests and historical address encodings.
//!
//! The wire format (spec SS6) signs with compact recoverable secp256k1
//! ECDSA so a block or transaction carries no explicit public key — the
//! signer's key is recovered from the signature plus the digest it signs
//! over. `AuthorityVerifier` (crate::authority) caches the recovered keys
//! for a transaction so repeated authority checks don't re-run recovery.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("malformed signature")]
    MalformedSignature,
    #[error("signature did not recover to a valid public key")]
    RecoveryFailed,
    #[error("signature does not verify against the recovered key")]
    VerificationFailed,
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A compressed secp256k1 public key, as carried on authority key_auths.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "serde_bytes_33")] pub [u8; 33]);

impl PublicKey {
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let bytes = key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(bytes.as_bytes());
        Self(out)
    }

    pub fn to_verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|_| CryptoError::RecoveryFailed)
    }

    /// Historical address derivation: RIPEMD160(SHA256(pubkey)), tagged with
    /// an encoding version so old and new derivations can coexist on-chain
    /// (spec SS4.5, BalanceClaim "any of the supported historical address
    /// encodings").
    pub fn to_address(&self, encoding: AddressEncoding) -> Address {
        let sha = sha256(&self.0);
        let mut ripemd = Ripemd160::new();
        ripemd.update(sha);
        let hash: [u8; 20] = ripemd.finalize().into();
        Address { hash, encoding }
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

mod serde_bytes_33 {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 33], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 33], D::Error> {
        let v: Vec<u8> = serde::Deserialize::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 33 bytes"))
    }
}

/// Which historical derivation produced an `Address`. The spec only
/// requires that `BalanceClaim` accept any of them; it does not mandate a
/// canonical one for new balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressEncoding {
    /// The original genesis-era derivation.
    Legacy,
    /// The current derivation used for newly issued balances.
    Current,
}

/// A derived address: a 20-byte hash plus which encoding produced it.
/// Text (base58/bech32) rendering is a wallet/CLI concern and out of scope
/// here; the core only needs to compare hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub hash: [u8; 20],
    pub encoding: AddressEncoding,
}

/// A 65-byte compact recoverable ECDSA signature: 64 bytes `(r, s)` plus a
/// 1-byte recovery id, as carried in the block and transaction wire format.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactSignature(#[serde(with = "serde_bytes_65")] pub [u8; 65]);

mod serde_bytes_65 {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 65], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 65], D::Error> {
        let v: Vec<u8> = serde::Deserialize::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("expected 65 bytes"))
    }
}

impl std::fmt::Debug for CompactSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompactSignature({})", hex::encode(self.0))
    }
}

/// Sign a 32-byte digest with a compact recoverable signature.
pub fn sign_recoverable(key: &SigningKey, digest: &[u8; 32]) -> CompactSignature {
    let (sig, recid): (Signature, RecoveryId) = key
        .sign_prehash_recoverable(digest)
        .expect("signing a 32-byte prehash cannot fail");
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recid.to_byte();
    CompactSignature(out)
}

/// Recover the public key that produced `sig` over `digest`.
pub fn recover_public_key(
    sig: &CompactSignature,
    digest: &[u8; 32],
) -> Result<PublicKey, CryptoError> {
    let signature =
        Signature::from_slice(&sig.0[..64]).map_err(|_| CryptoError::MalformedSignature)?;
    let recid = RecoveryId::from_byte(sig.0[64]).ok_or(CryptoError::MalformedSignature)?;
    let verifying_key = VerifyingKey::recover_from_prehash(digest, &signature, recid)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    verifying_key
        .verify_prehash(digest, &signature)
        .map_err(|_| CryptoError::VerificationFailed)?;
    Ok(PublicKey::from_verifying_key(&verifying_key))
}
