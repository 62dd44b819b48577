//! The BIP-143 signature digest.
//!
//! Fork-id coins commit to six rolling hashes and per-input data instead
//! of re-serializing the whole transaction. The three 32-byte commitments
//! come from the session's hash ledger; everything else is data of the one
//! input being signed.

use std::io::Write;

use streamsign_core::{
    hashes::{Hash256Digest, Hash256Writer, MarkedDigestWriter},
    ser::{ByteFormat, SerResult},
};

use crate::types::{Outpoint, ScriptSig};

/// The BIP-143 pre-image for one input. `digest()` is SHA-256 of the
/// serialized pre-image, hashed once more.
#[derive(Clone, Debug)]
pub struct Bip143Sighash<'a> {
    /// Transaction version.
    pub version: u32,
    /// Double-SHA-256 of all prevout points.
    pub hash_prevouts: &'a Hash256Digest,
    /// Double-SHA-256 of all input sequences.
    pub hash_sequence: &'a Hash256Digest,
    /// The prevout of the input being signed.
    pub outpoint: &'a Outpoint,
    /// The previous output's script, written with its VarInt length.
    pub script_code: &'a ScriptSig,
    /// The value of the previous output.
    pub amount: u64,
    /// The input's sequence.
    pub sequence: u32,
    /// Double-SHA-256 of all serialized outputs.
    pub hash_outputs: &'a Hash256Digest,
    /// Transaction locktime.
    pub lock_time: u32,
    /// `(forkid << 8) | sighash`.
    pub hash_type: u32,
}

impl Bip143Sighash<'_> {
    /// Compute the digest to sign.
    pub fn digest(&self) -> SerResult<Hash256Digest> {
        let mut w = Hash256Writer::default();
        w.write_all(&self.version.to_le_bytes())?;
        w.write_all(self.hash_prevouts)?;
        w.write_all(self.hash_sequence)?;
        self.outpoint.write_to(&mut w)?;
        self.script_code.write_to(&mut w)?;
        w.write_all(&self.amount.to_le_bytes())?;
        w.write_all(&self.sequence.to_le_bytes())?;
        w.write_all(self.hash_outputs)?;
        w.write_all(&self.lock_time.to_le_bytes())?;
        w.write_all(&self.hash_type.to_le_bytes())?;
        Ok(w.finish())
    }
}
