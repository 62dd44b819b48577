//! The rolling hash contexts a session carries.
//!
//! Three contexts feed the BIP-143 commitments (`hash_prevouts`,
//! `hash_sequence`, `hash_outputs`), one tracks prevouts paired with script
//! types, and one accumulates the commit hash: a digest over every input
//! and compiled output the host streamed in phase one, recomputed in phase
//! two to prove the host replayed the same transaction the user confirmed.

use sha2::{Digest, Sha256};

use streamsign_core::{hashes::Hash256Digest, ser::ByteFormat};

use crate::proto::{InputMsg, InputScriptType};
use crate::types::TxOut;

fn single(ctx: Sha256) -> Hash256Digest {
    ctx.finalize().into()
}

fn double(ctx: Sha256) -> Hash256Digest {
    Sha256::digest(ctx.finalize()).into()
}

pub(crate) struct HashLedger {
    prevouts: Sha256,
    sequences: Sha256,
    check: Sha256,
    outputs: Sha256,
    commit: Sha256,
    /// Double-SHA-256 of all prevout points, fixed after the last input.
    pub hash_prevouts: Hash256Digest,
    /// Double-SHA-256 of all input sequences, fixed after the last input.
    pub hash_sequence: Hash256Digest,
    /// Double-SHA-256 of all compiled outputs, fixed after confirmation.
    pub hash_outputs: Hash256Digest,
    /// The value phase two must reproduce. Written once from the
    /// prevout/script-type context at the input boundary, then replaced by
    /// the finalized phase-one commit hash.
    pub hash_check: Hash256Digest,
}

impl HashLedger {
    pub fn new(inputs_count: u32, outputs_count: u32, version: u32, lock_time: u32) -> Self {
        let mut ledger = Self {
            prevouts: Sha256::new(),
            sequences: Sha256::new(),
            check: Sha256::new(),
            outputs: Sha256::new(),
            commit: Sha256::new(),
            hash_prevouts: Hash256Digest::default(),
            hash_sequence: Hash256Digest::default(),
            hash_outputs: Hash256Digest::default(),
            hash_check: Hash256Digest::default(),
        };
        ledger.prime_commit(inputs_count, outputs_count, version, lock_time);
        ledger
    }

    fn prime_commit(&mut self, inputs_count: u32, outputs_count: u32, version: u32, lock_time: u32) {
        self.commit.update(inputs_count.to_le_bytes());
        self.commit.update(outputs_count.to_le_bytes());
        self.commit.update(version.to_le_bytes());
        self.commit.update(lock_time.to_le_bytes());
    }

    /// Open a fresh commit context for a phase-two pass.
    pub fn reset_commit(
        &mut self,
        inputs_count: u32,
        outputs_count: u32,
        version: u32,
        lock_time: u32,
    ) {
        self.commit = Sha256::new();
        self.prime_commit(inputs_count, outputs_count, version, lock_time);
    }

    /// Mix an input's semantic fields into the commit hash. Covers every
    /// field the host asserts, so any phase-two edit shows up.
    pub fn commit_input(&mut self, input: &InputMsg) {
        self.commit.update((input.address_n.len() as u32).to_le_bytes());
        for index in input.address_n.iter() {
            self.commit.update(index.to_le_bytes());
        }
        self.commit.update(input.prev_hash.0);
        self.commit.update(input.prev_index.to_le_bytes());
        self.commit.update([script_type_byte(input.script_type)]);
        self.commit.update(input.sequence().to_le_bytes());
        self.commit
            .update((input.script_sig.len() as u32).to_le_bytes());
        self.commit.update(input.script_sig.items());
        match &input.multisig {
            Some(multisig) => {
                self.commit.update([1u8]);
                self.commit.update(multisig.m().to_le_bytes());
                self.commit.update((multisig.n() as u32).to_le_bytes());
                for pubkey in multisig.pubkeys() {
                    self.commit.update(pubkey.as_ref());
                }
            }
            None => self.commit.update([0u8]),
        }
        match input.amount {
            Some(amount) => {
                self.commit.update([1u8]);
                self.commit.update(amount.to_le_bytes());
            }
            None => self.commit.update([0u8]),
        }
    }

    /// Mix a compiled output into the commit hash.
    pub fn commit_output(&mut self, output: &TxOut) {
        let mut buf = vec![];
        let _ = output.write_to(&mut buf);
        self.commit.update(&buf);
    }

    /// Feed the three per-input commitments.
    pub fn ingest_input(&mut self, input: &InputMsg) {
        let mut outpoint = vec![];
        let _ = input.outpoint().write_to(&mut outpoint);
        self.prevouts.update(&outpoint);
        self.sequences.update(input.sequence().to_le_bytes());
        self.check.update(&outpoint);
        self.check.update([script_type_byte(input.script_type)]);
    }

    /// Feed the output commitment.
    pub fn ingest_output(&mut self, output: &TxOut) {
        let mut buf = vec![];
        let _ = output.write_to(&mut buf);
        self.outputs.update(&buf);
    }

    /// Fix the input-side commitments. Called once, after the last
    /// previous transaction verifies.
    pub fn finalize_inputs(&mut self) {
        self.hash_prevouts = double(std::mem::take(&mut self.prevouts));
        self.hash_sequence = double(std::mem::take(&mut self.sequences));
        self.hash_check = single(std::mem::take(&mut self.check));
    }

    /// Fix the output commitment. Called once, after the user confirms.
    pub fn finalize_outputs(&mut self) {
        self.hash_outputs = double(std::mem::take(&mut self.outputs));
    }

    /// Finalize and return the current commit hash, leaving a fresh
    /// context behind.
    pub fn take_commit(&mut self) -> Hash256Digest {
        single(std::mem::take(&mut self.commit))
    }
}

fn script_type_byte(script_type: InputScriptType) -> u8 {
    match script_type {
        InputScriptType::SpendAddress => 0,
        InputScriptType::SpendMultisig => 1,
    }
}
