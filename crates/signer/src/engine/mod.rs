//! The signing state machine.
//!
//! One session signs one transaction. Control inverts between the engine
//! and the host: every host message advances the machine exactly one step,
//! which updates the rolling hashes, possibly emits a signed fragment, and
//! issues the next request. The machine never waits on anything but the
//! next message.
//!
//! Phase one (discovery): for each input, receive it, then stream and
//! verify the previous transaction it spends, crediting the referenced
//! output's value. Then receive each output, classify change, compile it,
//! and accumulate the spend total. Check funds, check the fee against the
//! coin ceiling, and gate on user confirmation.
//!
//! Phase two (signing): for each input, replay every input and output,
//! recompute the commit hash, and refuse to proceed if it differs from
//! phase one. Build the per-input digest (legacy serialization or BIP-143
//! for fork-id coins), sign it, and emit the serialized input with its
//! signature script. Finally replay each output once more, emitting its
//! serialized form, and finish.

mod bip143;
mod change;
mod ledger;
mod prevtx;
mod raw;

pub use bip143::Bip143Sighash;

use tracing::{debug, warn};

use streamsign_core::hashes::{ct_eq_32, Hash256Digest, Hash256Writer};

use crate::coins::CoinParams;
use crate::error::SignError;
use crate::keys::{DerivedKey, KeySource};
use crate::policy::OutputPolicy;
use crate::proto::{
    InputMsg, InputScriptType, OutputMsg, SerializedChunk, TxAck, TxMeta, TxRequest,
};
use crate::scripts::{p2pkh_script, p2pkh_sig_script};
use crate::stream::{estimate_size_kb, TxStream};
use crate::types::{ScriptSig, TxOut};
use crate::ui::ConfirmationUi;

use ledger::HashLedger;
use prevtx::{check_prev_hash, PrevTxVerifier};
use raw::{RawEvent, RawTxParser};

/// Commit to all inputs and all outputs.
const SIGHASH_ALL: u32 = 0x01;
/// Replay-protection flag OR-ed into the sighash on fork-id coins.
const SIGHASH_FORKID: u32 = 0x40;

/// Immutable facts about the transaction being signed, fixed at session
/// start.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignerOptions {
    /// Number of inputs the host will stream.
    pub inputs_count: u32,
    /// Number of outputs the host will stream.
    pub outputs_count: u32,
    /// Transaction version.
    pub version: u32,
    /// Transaction locktime.
    pub lock_time: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Stage {
    /// Phase 1: receiving input `idx1`.
    CollectInput,
    /// Phase 1: expecting the metadata (or first raw bytes) of the
    /// previous transaction spent by the retained input.
    PrevMeta,
    /// Phase 1: receiving previous-transaction input `idx2`.
    PrevInput,
    /// Phase 1: receiving previous-transaction output `idx2`.
    PrevOutput,
    /// Phase 1: receiving output `idx1`.
    CollectOutput,
    /// Phase 2: replaying input `idx2` while signing input `idx1`.
    SignInput,
    /// Phase 2: replaying output `idx2` while signing input `idx1`.
    SignOutput,
    /// Phase 2: replaying output `idx1` for final serialization.
    EmitOutput,
    /// The session ended (success or abort).
    Done,
}

/// A signing session. One per transaction; dropping it is an abort.
///
/// Created with [`Signer::new`], driven by [`Signer::advance`] until it
/// emits a [`crate::proto::RequestType::Finished`] request or returns an
/// error. Any error is fatal: session state is wiped before it surfaces,
/// and the driver reports one failure message to the host.
pub struct Signer<'a, K, P, U>
where
    K: KeySource,
    P: OutputPolicy,
    U: ConfirmationUi,
{
    coin: &'a CoinParams,
    keys: &'a K,
    policy: &'a P,
    ui: &'a mut U,

    inputs_count: u32,
    outputs_count: u32,
    version: u32,
    lock_time: u32,

    stage: Stage,
    idx1: u32,
    idx2: u32,

    to_spend: u64,
    spending: u64,
    change_spend: u64,
    change_seen: bool,

    multisig_fp: Hash256Digest,
    multisig_fp_set: bool,
    multisig_fp_mismatch: bool,

    ledger: HashLedger,
    input: InputMsg,
    prev: Option<PrevTxVerifier>,
    raw: Option<RawTxParser>,
    ti: Option<TxStream<Hash256Writer>>,
    out_stream: TxStream<Vec<u8>>,
    signing_key: Option<DerivedKey>,
    signing_script: ScriptSig,
}

impl<'a, K, P, U> Signer<'a, K, P, U>
where
    K: KeySource,
    P: OutputPolicy,
    U: ConfirmationUi,
{
    /// Open a session and issue the first request.
    pub fn new(
        options: SignerOptions,
        coin: &'a CoinParams,
        keys: &'a K,
        policy: &'a P,
        ui: &'a mut U,
    ) -> Result<(Self, TxRequest), SignError> {
        if options.inputs_count == 0 || options.outputs_count == 0 {
            return Err(SignError::Internal);
        }
        let ledger = HashLedger::new(
            options.inputs_count,
            options.outputs_count,
            options.version,
            options.lock_time,
        );
        let out_stream = TxStream::new(
            Vec::new(),
            options.version,
            options.inputs_count,
            options.outputs_count,
            options.lock_time,
        );
        let signer = Self {
            coin,
            keys,
            policy,
            ui,
            inputs_count: options.inputs_count,
            outputs_count: options.outputs_count,
            version: options.version,
            lock_time: options.lock_time,
            stage: Stage::CollectInput,
            idx1: 0,
            idx2: 0,
            to_spend: 0,
            spending: 0,
            change_spend: 0,
            change_seen: false,
            multisig_fp: Hash256Digest::default(),
            multisig_fp_set: false,
            multisig_fp_mismatch: false,
            ledger,
            input: InputMsg::default(),
            prev: None,
            raw: None,
            ti: None,
            out_stream,
            signing_key: None,
            signing_script: ScriptSig::null(),
        };
        debug!(
            inputs = options.inputs_count,
            outputs = options.outputs_count,
            coin = coin.shortcut,
            "signing session opened"
        );
        Ok((signer, TxRequest::input(0)))
    }

    /// Process one host message. `Ok(Some(_))` carries the next request;
    /// `Ok(None)` only occurs mid raw-stream, meaning "keep sending
    /// bytes". Any `Err` ends the session.
    pub fn advance(&mut self, ack: TxAck) -> Result<Option<TxRequest>, SignError> {
        debug!(stage = ?self.stage, idx1 = self.idx1, idx2 = self.idx2, "host message");
        let result = self.dispatch(ack);
        if let Err(err) = &result {
            warn!(%err, "signing aborted");
            self.wipe();
            self.ui.go_home();
        }
        result
    }

    fn dispatch(&mut self, ack: TxAck) -> Result<Option<TxRequest>, SignError> {
        match (self.stage, ack) {
            (Stage::Done, _) => Err(SignError::NotSigning),
            (Stage::CollectInput, TxAck::Input(input)) => self.collect_input(input),
            (Stage::PrevMeta, TxAck::Meta(meta)) => self.prev_meta(meta),
            (Stage::PrevMeta, TxAck::Raw(bytes)) => self.prev_raw(&bytes),
            (Stage::PrevInput, TxAck::Input(input)) => self.prev_input(input),
            (Stage::PrevOutput, TxAck::BinOutput(output)) => self.prev_output(output),
            (Stage::CollectOutput, TxAck::Output(output)) => self.collect_output(output),
            (Stage::SignInput, TxAck::Input(input)) => self.sign_input(input),
            (Stage::SignOutput, TxAck::Output(output)) => self.sign_output(output),
            (Stage::EmitOutput, TxAck::Output(output)) => self.emit_output(output),
            _ => Err(SignError::UnexpectedMessage),
        }
    }

    /// Zero session secrets and scratch. The derived scalar zeroizes when
    /// dropped.
    fn wipe(&mut self) {
        self.signing_key = None;
        self.signing_script = ScriptSig::null();
        self.input = InputMsg::default();
        self.prev = None;
        self.raw = None;
        self.ti = None;
        self.stage = Stage::Done;
    }

    /// The shared input fingerprint, when every input carried the same
    /// multisig descriptor.
    fn wallet_fp(&self) -> Option<&Hash256Digest> {
        (self.multisig_fp_set && !self.multisig_fp_mismatch).then(|| &self.multisig_fp)
    }

    fn track_input_fingerprint(&mut self, input: &InputMsg) -> Result<(), SignError> {
        match input.script_type {
            InputScriptType::SpendMultisig => {
                if let Some(multisig) = &input.multisig {
                    if !self.multisig_fp_mismatch {
                        let fingerprint = multisig
                            .fingerprint()
                            .ok_or(SignError::MultisigFingerprint)?;
                        if self.multisig_fp_set {
                            if !ct_eq_32(&fingerprint, &self.multisig_fp) {
                                self.multisig_fp_mismatch = true;
                            }
                        } else {
                            self.multisig_fp = fingerprint;
                            self.multisig_fp_set = true;
                        }
                    }
                }
            }
            InputScriptType::SpendAddress => self.multisig_fp_mismatch = true,
        }
        Ok(())
    }

    // ---- phase 1 ----

    fn collect_input(&mut self, input: InputMsg) -> Result<Option<TxRequest>, SignError> {
        self.track_input_fingerprint(&input)?;
        self.ledger.commit_input(&input);
        self.ledger.ingest_input(&input);
        self.input = input;
        self.stage = Stage::PrevMeta;
        Ok(Some(TxRequest::prev_meta(self.input.prev_hash)))
    }

    fn prev_meta(&mut self, meta: TxMeta) -> Result<Option<TxRequest>, SignError> {
        if self.raw.is_some() {
            return Err(SignError::UnexpectedMessage);
        }
        if meta.outputs_count == 0 {
            // a transaction with no outputs cannot fund anything
            return Err(SignError::InvalidPrevHash);
        }
        let verifier = PrevTxVerifier::new(&meta);
        self.idx2 = 0;
        self.prev = Some(verifier);
        if meta.inputs_count > 0 {
            self.stage = Stage::PrevInput;
            Ok(Some(TxRequest::prev_input(0, self.input.prev_hash)))
        } else {
            self.stage = Stage::PrevOutput;
            Ok(Some(TxRequest::prev_output(0, self.input.prev_hash)))
        }
    }

    fn prev_input(&mut self, input: InputMsg) -> Result<Option<TxRequest>, SignError> {
        let verifier = self.prev.as_mut().ok_or(SignError::Internal)?;
        verifier.add_input(&input)?;
        if self.idx2 + 1 < verifier.inputs_len() {
            self.idx2 += 1;
            Ok(Some(TxRequest::prev_input(self.idx2, self.input.prev_hash)))
        } else {
            self.idx2 = 0;
            self.stage = Stage::PrevOutput;
            Ok(Some(TxRequest::prev_output(0, self.input.prev_hash)))
        }
    }

    fn prev_output(&mut self, output: TxOut) -> Result<Option<TxRequest>, SignError> {
        let verifier = self.prev.as_mut().ok_or(SignError::Internal)?;
        verifier.add_output(&output)?;
        if self.idx2 == self.input.prev_index {
            self.to_spend = self
                .to_spend
                .checked_add(output.value)
                .ok_or(SignError::AmountOverflow)?;
        }
        if self.idx2 + 1 < verifier.outputs_len() {
            self.idx2 += 1;
            Ok(Some(TxRequest::prev_output(self.idx2, self.input.prev_hash)))
        } else {
            let verifier = self.prev.take().ok_or(SignError::Internal)?;
            verifier.verify(&self.input.prev_hash)?;
            self.next_after_prev()
        }
    }

    fn prev_raw(&mut self, bytes: &[u8]) -> Result<Option<TxRequest>, SignError> {
        let prev_index = self.input.prev_index;
        let parser = self
            .raw
            .get_or_insert_with(|| RawTxParser::new(prev_index));
        match parser.feed(bytes)? {
            RawEvent::NeedMore => Ok(None),
            RawEvent::Complete {
                txid,
                referenced_value,
            } => {
                self.raw = None;
                check_prev_hash(&txid, &self.input.prev_hash)?;
                self.to_spend = self
                    .to_spend
                    .checked_add(referenced_value)
                    .ok_or(SignError::AmountOverflow)?;
                self.next_after_prev()
            }
        }
    }

    /// The previous transaction verified; move to the next input or cross
    /// into the output sweep.
    fn next_after_prev(&mut self) -> Result<Option<TxRequest>, SignError> {
        if self.idx1 + 1 < self.inputs_count {
            self.idx1 += 1;
            self.stage = Stage::CollectInput;
            Ok(Some(TxRequest::input(self.idx1)))
        } else {
            self.ledger.finalize_inputs();
            self.idx1 = 0;
            self.idx2 = 0;
            self.stage = Stage::CollectOutput;
            Ok(Some(TxRequest::output(0)))
        }
    }

    fn collect_output(&mut self, output: OutputMsg) -> Result<Option<TxRequest>, SignError> {
        let is_change = change::classify(&output, self.wallet_fp())?;
        if is_change {
            if self.change_seen {
                return Err(SignError::OnlyOneChange);
            }
            self.change_seen = true;
            self.change_spend = output.amount;
        }

        let compiled = self.policy.compile_output(self.coin, &output, !is_change)?;
        self.spending = self
            .spending
            .checked_add(output.amount)
            .ok_or(SignError::AmountOverflow)?;
        self.ledger.commit_output(&compiled);
        self.ledger.ingest_output(&compiled);

        if self.idx1 + 1 < self.outputs_count {
            self.idx1 += 1;
            Ok(Some(TxRequest::output(self.idx1)))
        } else {
            self.confirm_and_enter_phase_two()
        }
    }

    fn confirm_and_enter_phase_two(&mut self) -> Result<Option<TxRequest>, SignError> {
        self.ledger.hash_check = self.ledger.take_commit();

        if self.spending > self.to_spend {
            return Err(SignError::NotEnoughFunds);
        }
        let fee = self.to_spend - self.spending;
        let estimated_kb = estimate_size_kb(self.inputs_count, self.outputs_count);
        let fee_str = self.coin.amount_str(fee);

        if fee > (estimated_kb as u64).saturating_mul(self.coin.maxfee_kb)
            && !self.ui.confirm_fee(&fee_str)
        {
            return Err(SignError::FeeCancelled);
        }

        let total_str = self.coin.amount_str(self.to_spend - self.change_spend);
        if !self.ui.confirm_transaction(&total_str, &fee_str) {
            return Err(SignError::Cancelled);
        }
        self.ui.show_signing();
        debug!(fee, "transaction confirmed, signing");

        self.ledger.finalize_outputs();
        self.idx1 = 0;
        self.idx2 = 0;
        self.stage = Stage::SignInput;
        Ok(Some(TxRequest::input(0)))
    }

    // ---- phase 2 ----

    /// Rebuild the previous output's script for the input being signed,
    /// and derive its key. If phase one established a shared multisig
    /// fingerprint, the input must still match it.
    fn compile_signing_script(
        &self,
        input: &InputMsg,
    ) -> Result<(DerivedKey, ScriptSig), SignError> {
        if !self.multisig_fp_mismatch {
            let still_matches = input.script_type == InputScriptType::SpendMultisig
                && input
                    .multisig
                    .as_ref()
                    .and_then(|m| m.fingerprint())
                    .map(|fp| ct_eq_32(&fp, &self.multisig_fp))
                    .unwrap_or(false);
            if !still_matches {
                return Err(SignError::InputCompile);
            }
        }
        let key = self.keys.derive(&input.address_n)?;
        let script: ScriptSig = match &input.multisig {
            Some(multisig) => {
                let redeem = multisig.redeem_script().ok_or(SignError::InputCompile)?;
                (&redeem).into()
            }
            None => (&p2pkh_script(&key.pubkey_hash())).into(),
        };
        if script.is_empty() {
            return Err(SignError::InputCompile);
        }
        Ok((key, script))
    }

    fn sign_input(&mut self, input: InputMsg) -> Result<Option<TxRequest>, SignError> {
        if self.idx2 == 0 {
            self.ti = Some(TxStream::new(
                Hash256Writer::default(),
                self.version,
                self.inputs_count,
                self.outputs_count,
                self.lock_time,
            ));
            self.ledger.reset_commit(
                self.inputs_count,
                self.outputs_count,
                self.version,
                self.lock_time,
            );
            self.signing_key = None;
            self.signing_script = ScriptSig::null();
        }
        self.ledger.commit_input(&input);

        let script_sig = if self.idx2 == self.idx1 {
            let (key, script) = self.compile_signing_script(&input)?;
            self.signing_key = Some(key);
            self.signing_script = script.clone();
            script
        } else {
            ScriptSig::null()
        };

        let ti = self.ti.as_mut().ok_or(SignError::Internal)?;
        ti.write_input(&input.outpoint(), &script_sig, input.sequence())
            .map_err(|_| SignError::SerializeInput)?;
        if self.idx2 == self.idx1 {
            self.input = input;
        }

        if self.idx2 + 1 < self.inputs_count {
            self.idx2 += 1;
            Ok(Some(TxRequest::input(self.idx2)))
        } else {
            self.idx2 = 0;
            self.stage = Stage::SignOutput;
            Ok(Some(TxRequest::output(0)))
        }
    }

    fn sign_output(&mut self, output: OutputMsg) -> Result<Option<TxRequest>, SignError> {
        let compiled = self.policy.compile_output(self.coin, &output, false)?;
        self.ledger.commit_output(&compiled);
        let ti = self.ti.as_mut().ok_or(SignError::Internal)?;
        ti.write_output(&compiled)
            .map_err(|_| SignError::SerializeOutput)?;

        if self.idx2 + 1 < self.outputs_count {
            self.idx2 += 1;
            Ok(Some(TxRequest::output(self.idx2)))
        } else {
            self.produce_signature()
        }
    }

    fn produce_signature(&mut self) -> Result<Option<TxRequest>, SignError> {
        // tamper check first: the replayed stream must hash to what the
        // user confirmed, regardless of digest algorithm
        let commit = self.ledger.take_commit();
        if !ct_eq_32(&commit, &self.ledger.hash_check) {
            return Err(SignError::TxChanged);
        }

        let ti = self.ti.take().ok_or(SignError::Internal)?;
        let sighash: u32;
        let digest: Hash256Digest;
        if self.coin.has_forkid {
            let amount = self.input.amount.ok_or(SignError::ForkidWithoutAmount)?;
            if amount > self.to_spend {
                return Err(SignError::TxChanged);
            }
            self.to_spend -= amount;

            sighash = SIGHASH_ALL | SIGHASH_FORKID;
            let outpoint = self.input.outpoint();
            let preimage = Bip143Sighash {
                version: self.version,
                hash_prevouts: &self.ledger.hash_prevouts,
                hash_sequence: &self.ledger.hash_sequence,
                outpoint: &outpoint,
                script_code: &self.signing_script,
                amount,
                sequence: self.input.sequence(),
                hash_outputs: &self.ledger.hash_outputs,
                lock_time: self.lock_time,
                hash_type: (self.coin.forkid << 8) | sighash,
            };
            digest = preimage.digest()?;
        } else {
            sighash = SIGHASH_ALL;
            digest = ti.finish_with_sighash(sighash)?;
        }

        let key = self.signing_key.take().ok_or(SignError::Internal)?;
        let der_sig = key.sign_digest(&digest)?;

        let script_sig = match self.input.script_type {
            InputScriptType::SpendMultisig => {
                let multisig = self
                    .input
                    .multisig
                    .as_mut()
                    .ok_or(SignError::MissingMultisig)?;
                let slot = multisig
                    .pubkey_index(&key.pubkey())
                    .ok_or(SignError::PubkeyNotFound)?;
                multisig.set_signature(slot, der_sig.clone());
                multisig
                    .script_sig(sighash as u8)
                    .ok_or(SignError::MultisigSerialize)?
            }
            InputScriptType::SpendAddress => {
                let mut sig_with_sighash = der_sig.clone();
                sig_with_sighash.push(sighash as u8);
                p2pkh_sig_script(&sig_with_sighash, &key.pubkey())
            }
        };

        self.out_stream
            .write_input(&self.input.outpoint(), &script_sig, self.input.sequence())
            .map_err(|_| SignError::SerializeInput)?;
        let chunk = SerializedChunk {
            signature_index: Some(self.idx1),
            signature: Some(der_sig),
            serialized_tx: self.out_stream.take_fragment(),
        };
        debug!(input = self.idx1, "signature produced");

        if self.idx1 + 1 < self.inputs_count {
            self.idx1 += 1;
            self.idx2 = 0;
            self.stage = Stage::SignInput;
            Ok(Some(TxRequest::input(0).with_serialized(chunk)))
        } else {
            self.idx1 = 0;
            self.stage = Stage::EmitOutput;
            Ok(Some(TxRequest::output(0).with_serialized(chunk)))
        }
    }

    fn emit_output(&mut self, output: OutputMsg) -> Result<Option<TxRequest>, SignError> {
        let compiled = self.policy.compile_output(self.coin, &output, false)?;
        self.out_stream
            .write_output(&compiled)
            .map_err(|_| SignError::SerializeOutput)?;
        let chunk = SerializedChunk {
            signature_index: None,
            signature: None,
            serialized_tx: self.out_stream.take_fragment(),
        };

        if self.idx1 + 1 < self.outputs_count {
            self.idx1 += 1;
            Ok(Some(TxRequest::output(self.idx1).with_serialized(chunk)))
        } else {
            debug!("signing session finished");
            self.wipe();
            self.ui.go_home();
            Ok(Some(TxRequest::finished().with_serialized(chunk)))
        }
    }
}
