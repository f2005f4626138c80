//! Core domain types used by the chain
//!
//! This module defines strongly-typed hashes, addresses, producer keys and
//! the block structures shared across the chain core. The goal is to avoid
//! "naked" byte buffers in public APIs and instead use domain-specific
//! newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Block, header, action and receipt types.
pub mod block;
/// Producer keys and signatures.
pub mod crypto;

pub use block::{
    Action, Block, BlockBuilder, Endorsement, Footer, Header, Log, Receipt, ReceiptStatus,
    RootError,
};
pub use crypto::{CryptoError, PrivateKey, PublicKey, Signature};

/// Length in bytes of all 256-bit hash types used in this module.
pub const HASH_LEN: usize = 32;

/// Length in bytes of an account / contract address.
pub const ADDRESS_LEN: usize = 20;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// Used for block hashes, action hashes and the transaction / receipt
/// roots carried in block headers. It is always exactly [`HASH_LEN`] bytes
/// long.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// The all-zero hash, used as the "no parent" marker.
    pub const ZERO: Hash256 = Hash256([0u8; HASH_LEN]);

    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    ///
    /// The result is deterministic for a given byte slice and is suitable
    /// for use as an identifier or content hash, but it is **not**
    /// a password hash or KDF.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Builds a hash from a slice, returning `None` on a length mismatch.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(Hash256(arr))
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Account or contract address.
///
/// Producer addresses are derived from the producer's public key as the
/// trailing [`ADDRESS_LEN`] bytes of its BLAKE3 digest.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The zero address. Token mints use it as the `from` side of a transfer.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Derives an [`Address`] from raw public key bytes.
    pub fn from_public_key(pk_bytes: &[u8]) -> Self {
        let digest = Hash256::compute(pk_bytes);
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest.0[HASH_LEN - ADDRESS_LEN..]);
        Address(out)
    }

    /// Parses a hex address, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
        let arr: [u8; ADDRESS_LEN] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidAddress(format!(
                "expected {ADDRESS_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Address(arr))
    }

    /// Returns the raw address bytes.
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Encodes `value` with the canonical bincode-2 `standard()` configuration.
///
/// # Panics
///
/// Panics if encoding fails. All chain types are plain data with derived
/// `Serialize` impls, so a failure here is a programming error.
pub(crate) fn canonical_encode<T: Serialize>(value: &T) -> Vec<u8> {
    let cfg = bincode::config::standard();
    bincode::serde::encode_to_vec(value, cfg)
        .expect("chain types should always be serializable with bincode 2 + serde")
}

/// Decodes a value previously produced by [`canonical_encode`].
pub(crate) fn canonical_decode<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, bincode::error::DecodeError> {
    let cfg = bincode::config::standard();
    let (value, _): (T, usize) = bincode::serde::decode_from_slice(bytes, cfg)?;
    Ok(value)
}
