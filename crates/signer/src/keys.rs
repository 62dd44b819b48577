//! The seam to the key store.
//!
//! HD derivation itself is out of scope for this crate: whatever owns the
//! seed implements [`KeySource`] and hands the engine one [`DerivedKey`]
//! per input path. The engine wipes its copy when the session ends (the
//! underlying scalar zeroizes on drop).

use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey, VerifyingKey};
use thiserror::Error;

use streamsign_core::hashes::Hash256Digest;

use crate::scripts::hash160;

/// Errors surfaced by key derivation or signing.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The key store could not derive a key for the requested path.
    #[error("Failed to derive private key")]
    Derivation,

    /// The ECDSA backend rejected the signing request.
    #[error("Failed to sign digest")]
    Signing,
}

/// A private key derived for one input, plus the cached compressed pubkey.
#[derive(Clone)]
pub struct DerivedKey {
    key: SigningKey,
    pubkey: [u8; 33],
}

impl DerivedKey {
    /// Wrap an existing signing key.
    pub fn new(key: SigningKey) -> Self {
        let point = VerifyingKey::from(&key).to_encoded_point(true);
        let mut pubkey = [0u8; 33];
        pubkey.copy_from_slice(point.as_bytes());
        Self { key, pubkey }
    }

    /// Construct from raw scalar bytes. Fails on zero or out-of-order
    /// scalars.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        SigningKey::from_slice(bytes)
            .map(Self::new)
            .map_err(|_| KeyError::Derivation)
    }

    /// The compressed SEC1 public key.
    pub fn pubkey(&self) -> [u8; 33] {
        self.pubkey
    }

    /// HASH160 of the compressed public key.
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.pubkey)
    }

    /// Deterministic (RFC 6979) ECDSA over a 32-byte digest, returned as
    /// low-s DER bytes without a sighash suffix.
    pub fn sign_digest(&self, digest: &Hash256Digest) -> Result<Vec<u8>, KeyError> {
        let sig: Signature = self.key.sign_prehash(digest).map_err(|_| KeyError::Signing)?;
        let sig = sig.normalize_s().unwrap_or(sig);
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// The verifying half, for tests and callers that re-check signatures.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.key)
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print key material
        f.debug_struct("DerivedKey")
            .field("pubkey", &hex::encode(self.pubkey))
            .finish()
    }
}

/// The `m/…` derivation contract consumed by the engine. Implementations
/// derive the private key for a BIP32-style path of raw u32 indices.
pub trait KeySource {
    /// Derive the key for `path`.
    fn derive(&self, path: &[u32]) -> Result<DerivedKey, KeyError>;
}
