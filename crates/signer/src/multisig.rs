//! Multisig descriptors and the scripts derived from them.
//!
//! The signing engine itself never inspects a descriptor: it compares
//! 32-byte fingerprints for equality (change detection), asks for the slot
//! of a pubkey (signature placement), and requests the compiled redeem or
//! signature script. Everything else here is private.

use sha2::{Digest, Sha256};
use std::io::{Read, Write};

use streamsign_core::{
    hashes::Hash256Digest,
    impl_hex_serde,
    ser::{ByteFormat, SerError, SerResult},
};

use crate::scripts::{push_data, OP_0, OP_1, OP_CHECKMULTISIG};
use crate::types::{Script, ScriptSig};

/// The most cosigners a standard multisig script can name.
pub const MAX_MULTISIG_KEYS: usize = 15;

/// A compressed secp256k1 public key.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CompressedPubkey(pub [u8; 33]);

impl AsRef<[u8]> for CompressedPubkey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 33]> for CompressedPubkey {
    fn from(bytes: [u8; 33]) -> Self {
        Self(bytes)
    }
}

impl ByteFormat for CompressedPubkey {
    type Error = SerError;

    fn serialized_length(&self) -> usize {
        33
    }

    fn read_from<R>(reader: &mut R, _limit: usize) -> SerResult<Self>
    where
        R: Read,
        Self: std::marker::Sized,
    {
        let mut buf = [0u8; 33];
        reader.read_exact(&mut buf)?;
        Ok(Self(buf))
    }

    fn write_to<W>(&self, writer: &mut W) -> SerResult<usize>
    where
        W: Write,
    {
        Ok(writer.write(&self.0)?)
    }
}

impl_hex_serde!(CompressedPubkey);

/// An m-of-n multisig descriptor: the signature threshold, the cosigner
/// pubkeys in script order, and one signature slot per cosigner. Absent
/// signatures are empty vectors.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct MultisigInfo {
    m: u32,
    pubkeys: Vec<CompressedPubkey>,
    signatures: Vec<Vec<u8>>,
}

impl MultisigInfo {
    /// Build a descriptor with empty signature slots.
    pub fn new(m: u32, pubkeys: Vec<CompressedPubkey>) -> Self {
        let signatures = vec![vec![]; pubkeys.len()];
        Self {
            m,
            pubkeys,
            signatures,
        }
    }

    /// The signature threshold.
    pub fn m(&self) -> u32 {
        self.m
    }

    /// The number of cosigners.
    pub fn n(&self) -> usize {
        self.pubkeys.len()
    }

    /// The cosigner pubkeys, in script order.
    pub fn pubkeys(&self) -> &[CompressedPubkey] {
        &self.pubkeys
    }

    fn shape_valid(&self) -> bool {
        let n = self.n();
        let m = self.m as usize;
        m >= 1 && m <= n && n >= 1 && n <= MAX_MULTISIG_KEYS && self.signatures.len() == n
    }

    /// A deterministic 32-byte digest of the descriptor: threshold, count,
    /// and pubkeys in order. Inputs and change outputs of the same wallet
    /// share a fingerprint. `None` when the shape is malformed.
    pub fn fingerprint(&self) -> Option<Hash256Digest> {
        if !self.shape_valid() {
            return None;
        }
        let mut hasher = Sha256::new();
        hasher.update(self.m.to_le_bytes());
        hasher.update((self.n() as u32).to_le_bytes());
        for pubkey in self.pubkeys.iter() {
            hasher.update(pubkey.as_ref());
        }
        Some(hasher.finalize().into())
    }

    /// The slot of `pubkey` within the descriptor, if present.
    pub fn pubkey_index(&self, pubkey: &[u8; 33]) -> Option<usize> {
        self.pubkeys.iter().position(|p| &p.0 == pubkey)
    }

    /// Store a DER signature (without sighash byte) in the given slot.
    pub fn set_signature(&mut self, idx: usize, der_sig: Vec<u8>) {
        if idx < self.signatures.len() {
            self.signatures[idx] = der_sig;
        }
    }

    /// The `OP_m <pubkeys...> OP_n OP_CHECKMULTISIG` redeem script.
    /// `None` when the shape is malformed.
    pub fn redeem_script(&self) -> Option<Script> {
        if !self.shape_valid() {
            return None;
        }
        let mut script = Vec::with_capacity(3 + 34 * self.n());
        script.push(OP_1 + (self.m as u8) - 1);
        for pubkey in self.pubkeys.iter() {
            push_data(&mut script, pubkey.as_ref());
        }
        script.push(OP_1 + (self.n() as u8) - 1);
        script.push(OP_CHECKMULTISIG);
        Some(script.into())
    }

    /// The full signature script: `OP_0`, each present signature with the
    /// sighash byte appended, then the pushed redeem script. `None` when
    /// the descriptor is malformed.
    pub fn script_sig(&self, sighash: u8) -> Option<ScriptSig> {
        let redeem = self.redeem_script()?;
        let mut script = vec![OP_0];
        for sig in self.signatures.iter().filter(|s| !s.is_empty()) {
            let mut with_sighash = Vec::with_capacity(sig.len() + 1);
            with_sighash.extend_from_slice(sig);
            with_sighash.push(sighash);
            push_data(&mut script, &with_sighash);
        }
        push_data(&mut script, redeem.items());
        Some(script.into())
    }
}
