//! Producer keys and block signatures.
//!
//! Block producers sign the header core with an Ed25519 key. Public keys
//! and signatures travel inside headers as opaque byte wrappers so that
//! malformed material can still be decoded and then rejected by
//! [`PublicKey::verify`] instead of failing deserialization.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Address;

/// Errors raised while decoding key material or addresses.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Ed25519 public key bytes, wrapped to avoid naked `Vec<u8>`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PublicKey {
    /// Returns the raw public key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Address of the account owning this key.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.0)
    }

    /// Verifies a detached signature over `msg`.
    ///
    /// Returns `false` for malformed keys or signatures rather than an
    /// error: from the caller's point of view both mean "not signed by
    /// this producer".
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(self.0.as_slice()) else {
            return false;
        };
        let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig) = ed25519_dalek::Signature::from_slice(&signature.0) else {
            return false;
        };
        key.verify(msg, &sig).is_ok()
    }
}

/// Detached Ed25519 signature bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl Signature {
    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Block producer signing key.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Builds a key from a 32-byte secret.
    pub fn from_bytes(secret: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = secret.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey(format!("expected 32 bytes, got {}", secret.len()))
        })?;
        Ok(PrivateKey(SigningKey::from_bytes(&arr)))
    }

    /// Parses a hex-encoded secret, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, CryptoError> {
        let raw = s.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(raw).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Public half of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().to_bytes().to_vec())
    }

    /// Signs `msg` and returns the detached signature.
    pub fn sign(&self, msg: &[u8]) -> Signature {
        Signature(self.0.sign(msg).to_bytes().to_vec())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PrivateKey")
            .field(&self.public_key().address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let key = PrivateKey::from_bytes(&[7u8; 32]).unwrap();
        let pk = key.public_key();
        let sig = key.sign(b"header core");

        assert!(pk.verify(b"header core", &sig));
        assert!(!pk.verify(b"other message", &sig));
    }

    #[test]
    fn verify_rejects_malformed_material() {
        let key = PrivateKey::from_bytes(&[7u8; 32]).unwrap();
        let sig = key.sign(b"msg");

        assert!(!PublicKey(vec![1, 2, 3]).verify(b"msg", &sig));
        assert!(!key.public_key().verify(b"msg", &Signature(vec![0u8; 10])));
    }

    #[test]
    fn from_hex_accepts_prefix_and_rejects_short_keys() {
        let hex_key = format!("0x{}", hex::encode([9u8; 32]));
        let key = PrivateKey::from_hex(&hex_key).unwrap();
        assert_eq!(
            key.public_key(),
            PrivateKey::from_bytes(&[9u8; 32]).unwrap().public_key()
        );

        assert!(PrivateKey::from_hex("abcd").is_err());
        assert!(PrivateKey::from_hex("not-hex").is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let key = PrivateKey::from_bytes(&[9u8; 32]).unwrap();
        let dbg = format!("{key:?}");
        assert!(!dbg.contains(&hex::encode([9u8; 32])));
    }
}
