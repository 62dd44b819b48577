//! End-to-end signing sessions, driven the way a host drives the device:
//! one request, one answer, until `Finished` or failure.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::Signature;
use sha2::Sha256;

use streamsign::coins::{self, CoinParams};
use streamsign::engine::{Bip143Sighash, Signer, SignerOptions};
use streamsign::error::{FailureKind, SignError};
use streamsign::hashes::TXID;
use streamsign::keys::{DerivedKey, KeyError, KeySource};
use streamsign::multisig::{CompressedPubkey, MultisigInfo};
use streamsign::policy::{OutputPolicy, StandardPolicy};
use streamsign::proto::{
    AddressKind, InputMsg, InputScriptType, OutputMsg, OutputScriptType, RequestType, TxAck,
    TxMeta, TxRequest,
};
use streamsign::scripts::{p2pkh_script, p2pkh_sig_script};
use streamsign::stream::TxStream;
use streamsign::types::{ScriptPubkey, ScriptSig, TxOut};
use streamsign::ui::ConfirmationUi;
use streamsign_core::hashes::{Hash256Digest, Hash256Writer, MarkedDigestWriter};
use streamsign_core::ser::ByteFormat;

// ---- harness ----

struct TestKeys {
    seed: [u8; 32],
}

impl TestKeys {
    fn new() -> Self {
        Self { seed: [0x5e; 32] }
    }
}

impl KeySource for TestKeys {
    fn derive(&self, path: &[u32]) -> Result<DerivedKey, KeyError> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.seed).map_err(|_| KeyError::Derivation)?;
        for index in path {
            mac.update(&index.to_le_bytes());
        }
        let bytes: [u8; 32] = mac.finalize().into_bytes().into();
        DerivedKey::from_bytes(&bytes)
    }
}

#[derive(Default)]
struct RecordingUi {
    fee_prompts: Vec<String>,
    tx_prompts: Vec<(String, String)>,
    signing_shown: u32,
    home_calls: u32,
    reject_fee: bool,
    reject_tx: bool,
}

impl ConfirmationUi for RecordingUi {
    fn confirm_fee(&mut self, fee: &str) -> bool {
        self.fee_prompts.push(fee.to_string());
        !self.reject_fee
    }

    fn confirm_transaction(&mut self, total: &str, fee: &str) -> bool {
        self.tx_prompts.push((total.to_string(), fee.to_string()));
        !self.reject_tx
    }

    fn show_signing(&mut self) {
        self.signing_shown += 1;
    }

    fn go_home(&mut self) {
        self.home_calls += 1;
    }
}

struct PrevTx {
    meta: TxMeta,
    inputs: Vec<InputMsg>,
    outputs: Vec<TxOut>,
    raw: Vec<u8>,
    txid: TXID,
}

/// A previous transaction with one dummy input and the given outputs.
fn make_prev_tx(outputs: Vec<TxOut>) -> PrevTx {
    let input = InputMsg {
        prev_hash: TXID::deserialize_hex(
            "7777777777777777777777777777777777777777777777777777777777777777",
        )
        .unwrap(),
        prev_index: 0,
        script_sig: ScriptSig::new(vec![0x00, 0x51]),
        sequence: Some(0xffff_ffff),
        ..Default::default()
    };
    let meta = TxMeta {
        version: 1,
        lock_time: 0,
        inputs_count: 1,
        outputs_count: outputs.len() as u32,
    };

    let mut bytes = TxStream::new(vec![], meta.version, 1, meta.outputs_count, meta.lock_time);
    bytes
        .write_input(&input.outpoint(), &input.script_sig, input.sequence())
        .unwrap();
    for output in outputs.iter() {
        bytes.write_output(output).unwrap();
    }
    let raw = bytes.take_fragment();

    let mut hasher = Hash256Writer::default();
    std::io::Write::write_all(&mut hasher, &raw).unwrap();
    let txid: TXID = hasher.finish_marked();

    PrevTx {
        meta,
        inputs: vec![input],
        outputs,
        raw,
        txid,
    }
}

struct Host {
    inputs: Vec<InputMsg>,
    outputs: Vec<OutputMsg>,
    /// Outputs served once the first sweep is exhausted; normally
    /// identical to `outputs`.
    phase2_outputs: Vec<OutputMsg>,
    phase2_inputs: Vec<InputMsg>,
    prevs: HashMap<TXID, PrevTx>,
    output_serves: usize,
    input_serves: usize,
    /// When set, previous transactions are streamed as raw bytes in
    /// chunks of this size.
    raw_chunk: Option<usize>,
}

impl Host {
    fn new(inputs: Vec<InputMsg>, outputs: Vec<OutputMsg>, prevs: Vec<PrevTx>) -> Self {
        let prevs = prevs.into_iter().map(|p| (p.txid, p)).collect();
        Self {
            phase2_outputs: outputs.clone(),
            phase2_inputs: inputs.clone(),
            inputs,
            outputs,
            prevs,
            output_serves: 0,
            input_serves: 0,
            raw_chunk: None,
        }
    }

    fn prev(&self, hash: &TXID) -> &PrevTx {
        self.prevs.get(hash).expect("unknown prev hash requested")
    }

    fn answer(&mut self, req: &TxRequest) -> TxAck {
        let idx = req.details.request_index.unwrap_or(0) as usize;
        match (req.request_type, req.details.tx_hash) {
            (RequestType::Meta, Some(hash)) => TxAck::Meta(self.prev(&hash).meta),
            (RequestType::Input, Some(hash)) => TxAck::Input(self.prev(&hash).inputs[idx].clone()),
            (RequestType::Output, Some(hash)) => {
                TxAck::BinOutput(self.prev(&hash).outputs[idx].clone())
            }
            (RequestType::Input, None) => {
                self.input_serves += 1;
                if self.input_serves <= self.inputs.len() {
                    TxAck::Input(self.inputs[idx].clone())
                } else {
                    TxAck::Input(self.phase2_inputs[idx].clone())
                }
            }
            (RequestType::Output, None) => {
                self.output_serves += 1;
                if self.output_serves <= self.outputs.len() {
                    TxAck::Output(self.outputs[idx].clone())
                } else {
                    TxAck::Output(self.phase2_outputs[idx].clone())
                }
            }
            (RequestType::Finished, _) => panic!("finished request needs no answer"),
            (RequestType::Meta, None) => unreachable!("meta requests always carry a tx_hash"),
        }
    }
}

#[derive(Default, Debug)]
struct Outcome {
    signatures: Vec<(u32, Vec<u8>)>,
    serialized: Vec<u8>,
}

fn drive<K, P, U>(
    signer: &mut Signer<'_, K, P, U>,
    host: &mut Host,
    first: TxRequest,
) -> Result<Outcome, SignError>
where
    K: KeySource,
    P: OutputPolicy,
    U: ConfirmationUi,
{
    let mut outcome = Outcome::default();
    let mut req = first;
    for _ in 0..10_000 {
        if let Some(chunk) = &req.serialized {
            if let (Some(index), Some(sig)) = (chunk.signature_index, chunk.signature.clone()) {
                outcome.signatures.push((index, sig));
            }
            outcome.serialized.extend_from_slice(&chunk.serialized_tx);
        }
        if req.request_type == RequestType::Finished {
            return Ok(outcome);
        }

        req = match (req.request_type, req.details.tx_hash, host.raw_chunk) {
            (RequestType::Meta, Some(hash), Some(chunk_size)) => {
                let raw = host.prev(&hash).raw.clone();
                let mut next = None;
                for piece in raw.chunks(chunk_size) {
                    if let Some(r) = signer.advance(TxAck::Raw(piece.to_vec()))? {
                        next = Some(r);
                        break;
                    }
                }
                next.expect("raw stream ended before locktime")
            }
            _ => {
                let ack = host.answer(&req);
                signer.advance(ack)?.expect("expected a request")
            }
        };
    }
    panic!("session did not terminate");
}

fn external_address() -> String {
    let mut payload = vec![0x00];
    payload.extend_from_slice(&[0xd0; 20]);
    bs58::encode(payload).with_check().into_string()
}

fn spend_output(amount: u64) -> OutputMsg {
    OutputMsg {
        address: Some(external_address()),
        amount,
        script_type: OutputScriptType::PayToAddress,
        address_type: Some(AddressKind::Spend),
        ..Default::default()
    }
}

fn change_output(amount: u64, path: Vec<u32>) -> OutputMsg {
    OutputMsg {
        address_n: path,
        amount,
        script_type: OutputScriptType::PayToAddress,
        address_type: Some(AddressKind::Change),
        ..Default::default()
    }
}

/// A single-sig input funded by a fresh previous transaction paying
/// `amount` to the key at `path`, at output index `prev_index`.
fn funded_input(
    keys: &TestKeys,
    path: Vec<u32>,
    amount: u64,
    prev_index: u32,
) -> (InputMsg, PrevTx) {
    let key = keys.derive(&path).unwrap();
    let mut outputs = vec![];
    for i in 0..=prev_index {
        if i == prev_index {
            outputs.push(TxOut::new(amount, p2pkh_script(&key.pubkey_hash())));
        } else {
            // unrelated padding output
            outputs.push(TxOut::new(5_000u64, ScriptPubkey::new(vec![0x51])));
        }
    }
    let prev = make_prev_tx(outputs);
    let input = InputMsg {
        address_n: path,
        prev_hash: prev.txid,
        prev_index,
        sequence: Some(0xffff_fffe),
        script_type: InputScriptType::SpendAddress,
        ..Default::default()
    };
    (input, prev)
}

fn options(inputs: u32, outputs: u32) -> SignerOptions {
    SignerOptions {
        inputs_count: inputs,
        outputs_count: outputs,
        version: 1,
        lock_time: 0,
    }
}

fn run_session(
    coin: &CoinParams,
    opts: SignerOptions,
    host: &mut Host,
    ui: &mut RecordingUi,
) -> Result<Outcome, SignError> {
    let keys = TestKeys::new();
    let policy = StandardPolicy::new(&keys);
    let (mut signer, first) = Signer::new(opts, coin, &keys, &policy, ui)?;
    drive(&mut signer, host, first)
}

// ---- scenarios ----

#[test]
fn one_in_one_out_legacy() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    let outputs = vec![spend_output(90_000)];
    let mut host = Host::new(vec![input.clone()], outputs.clone(), vec![prev]);
    let mut ui = RecordingUi::default();

    let outcome = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap();

    assert_eq!(outcome.signatures.len(), 1);
    assert_eq!(outcome.signatures[0].0, 0);
    assert!(ui.fee_prompts.is_empty());
    assert_eq!(ui.tx_prompts.len(), 1);
    // fee = 100_000 - 90_000
    assert_eq!(ui.tx_prompts[0].1, "0.0001 BTC");
    assert_eq!(ui.signing_shown, 1);
    assert_eq!(ui.home_calls, 1);

    // property: the signature verifies against the legacy digest
    let key = keys.derive(&[0, 1]).unwrap();
    let policy = StandardPolicy::new(&keys);
    let compiled = policy
        .compile_output(&coins::BITCOIN, &outputs[0], true)
        .unwrap();
    let script_code: ScriptSig = (&p2pkh_script(&key.pubkey_hash())).into();
    let mut ti = TxStream::new(Hash256Writer::default(), 1, 1, 1, 0);
    ti.write_input(&input.outpoint(), &script_code, input.sequence())
        .unwrap();
    ti.write_output(&compiled).unwrap();
    let digest = ti.finish_with_sighash(0x01).unwrap();
    let sig = Signature::from_der(&outcome.signatures[0].1).unwrap();
    key.verifying_key().verify_prehash(&digest, &sig).unwrap();

    // the emitted stream is the complete signed transaction
    let mut sig_with_sighash = outcome.signatures[0].1.clone();
    sig_with_sighash.push(0x01);
    let mut expected = TxStream::new(vec![], 1, 1, 1, 0);
    expected
        .write_input(
            &input.outpoint(),
            &p2pkh_sig_script(&sig_with_sighash, &key.pubkey()),
            input.sequence(),
        )
        .unwrap();
    expected.write_output(&compiled).unwrap();
    assert_eq!(outcome.serialized, expected.take_fragment());
}

#[test]
fn two_in_two_out_with_change() {
    let keys = TestKeys::new();
    let (input_a, prev_a) = funded_input(&keys, vec![0, 1], 60_000, 0);
    let (input_b, prev_b) = funded_input(&keys, vec![0, 2], 50_000, 1);
    let outputs = vec![spend_output(95_000), change_output(12_000, vec![1, 0])];
    let mut host = Host::new(
        vec![input_a, input_b],
        outputs,
        vec![prev_a, prev_b],
    );
    let mut ui = RecordingUi::default();

    let outcome = run_session(&coins::BITCOIN, options(2, 2), &mut host, &mut ui).unwrap();

    assert_eq!(outcome.signatures.len(), 2);
    assert_eq!(outcome.signatures[0].0, 0);
    assert_eq!(outcome.signatures[1].0, 1);
    // to_spend 110_000, spending 107_000, change 12_000
    assert_eq!(ui.tx_prompts.len(), 1);
    assert_eq!(ui.tx_prompts[0].0, "0.00098 BTC");
    assert_eq!(ui.tx_prompts[0].1, "0.00003 BTC");
}

#[test]
fn forkid_bip143_signature() {
    let keys = TestKeys::new();
    let (mut input, prev) = funded_input(&keys, vec![3, 1], 200_000, 0);
    input.amount = Some(200_000);
    let outputs = vec![spend_output(199_000)];
    let mut host = Host::new(vec![input.clone()], outputs.clone(), vec![prev]);
    let mut ui = RecordingUi::default();

    let outcome =
        run_session(&coins::BITCOIN_CASH, options(1, 1), &mut host, &mut ui).unwrap();
    assert_eq!(outcome.signatures.len(), 1);

    // rebuild the BIP-143 digest with sighash ALL|FORKID (0x41)
    let keys = TestKeys::new();
    let key = keys.derive(&[3, 1]).unwrap();
    let policy = StandardPolicy::new(&keys);
    let compiled = policy
        .compile_output(&coins::BITCOIN_CASH, &outputs[0], true)
        .unwrap();

    let mut w = Hash256Writer::default();
    input.outpoint().write_to(&mut w).unwrap();
    let hash_prevouts: Hash256Digest = w.finish();
    let mut w = Hash256Writer::default();
    std::io::Write::write_all(&mut w, &input.sequence().to_le_bytes()).unwrap();
    let hash_sequence: Hash256Digest = w.finish();
    let mut w = Hash256Writer::default();
    compiled.write_to(&mut w).unwrap();
    let hash_outputs: Hash256Digest = w.finish();

    let outpoint = input.outpoint();
    let script_code: ScriptSig = (&p2pkh_script(&key.pubkey_hash())).into();
    let digest = Bip143Sighash {
        version: 1,
        hash_prevouts: &hash_prevouts,
        hash_sequence: &hash_sequence,
        outpoint: &outpoint,
        script_code: &script_code,
        amount: 200_000,
        sequence: input.sequence(),
        hash_outputs: &hash_outputs,
        lock_time: 0,
        hash_type: 0x41,
    }
    .digest()
    .unwrap();

    let sig = Signature::from_der(&outcome.signatures[0].1).unwrap();
    key.verifying_key().verify_prehash(&digest, &sig).unwrap();

    // the serialized input's pushed signature ends with the 0x41 byte:
    // version(4), count(1), outpoint(36), script length(1), then the push
    let serialized = &outcome.serialized;
    let push_len = serialized[42] as usize;
    assert_eq!(serialized[42 + push_len], 0x41);
}

#[test]
fn tampered_phase_two_output_aborts() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    let outputs = vec![spend_output(50_000), spend_output(40_000)];
    let mut host = Host::new(vec![input], outputs, vec![prev]);
    host.phase2_outputs[1].amount += 1;
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN, options(1, 2), &mut host, &mut ui).unwrap_err();
    match &err {
        SignError::TxChanged => {}
        other => panic!("expected tamper failure, got {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::Other);
    assert_eq!(err.to_string(), "Transaction has changed during signing");
    assert_eq!(ui.home_calls, 1);
}

#[test]
fn tampered_phase_two_input_aborts() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    let outputs = vec![spend_output(90_000)];
    let mut host = Host::new(vec![input], outputs, vec![prev]);
    host.phase2_inputs[0].sequence = Some(0x1234_5678);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::TxChanged));
}

#[test]
fn insufficient_funds_aborts_before_confirmation() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 50_000, 0);
    let outputs = vec![spend_output(60_000)];
    let mut host = Host::new(vec![input], outputs, vec![prev]);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::NotEnoughFunds));
    assert_eq!(err.kind(), FailureKind::NotEnoughFunds);
    assert!(ui.tx_prompts.is_empty());
    assert!(ui.fee_prompts.is_empty());
}

#[test]
fn raw_streaming_matches_structured_mode() {
    for chunk in [1usize, 17, 4096] {
        let keys = TestKeys::new();
        let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
        let outputs = vec![spend_output(90_000)];

        let mut structured = Host::new(vec![input.clone()], outputs.clone(), vec![prev]);
        let mut ui = RecordingUi::default();
        let expected =
            run_session(&coins::BITCOIN, options(1, 1), &mut structured, &mut ui).unwrap();

        let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
        let mut raw_host = Host::new(vec![input], outputs.clone(), vec![prev]);
        raw_host.raw_chunk = Some(chunk);
        let mut ui = RecordingUi::default();
        let outcome = run_session(&coins::BITCOIN, options(1, 1), &mut raw_host, &mut ui).unwrap();

        // deterministic nonces: both paths produce identical signatures
        assert_eq!(outcome.signatures, expected.signatures);
        assert_eq!(outcome.serialized, expected.serialized);
    }
}

#[test]
fn invalid_raw_prevhash_aborts() {
    let keys = TestKeys::new();
    let (input, mut prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    // corrupt the version field: structure parses, hash diverges
    prev.raw[0] ^= 0x01;
    let outputs = vec![spend_output(90_000)];
    let mut host = Host::new(vec![input], outputs, vec![prev]);
    host.raw_chunk = Some(9);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::InvalidPrevHash));
    assert_eq!(err.to_string(), "Encountered invalid prevhash");
}

#[test]
fn invalid_structured_prevhash_aborts() {
    let keys = TestKeys::new();
    let (input, mut prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    prev.meta.lock_time = 999;
    let mut host = Host::new(vec![input], vec![spend_output(90_000)], vec![prev]);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::InvalidPrevHash));
}

#[test]
fn duplicate_change_aborts() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    let outputs = vec![change_output(30_000, vec![1, 0]), change_output(40_000, vec![1, 1])];
    let mut host = Host::new(vec![input], outputs, vec![prev]);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN, options(1, 2), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::OnlyOneChange));
    assert_eq!(err.to_string(), "Only one change output allowed");
}

#[test]
fn fee_over_threshold_prompts_once() {
    let keys = TestKeys::new();
    // BTC ceiling is 0.02 BTC/kB and this tx estimates to 1 kB
    let (input, prev) = funded_input(&keys, vec![0, 1], 10_000_000, 0);
    let outputs = vec![spend_output(1_000_000)];
    let mut host = Host::new(vec![input], outputs, vec![prev]);
    let mut ui = RecordingUi::default();

    let outcome = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap();
    assert_eq!(outcome.signatures.len(), 1);
    assert_eq!(ui.fee_prompts, vec!["0.09 BTC".to_string()]);
}

#[test]
fn fee_rejection_cancels() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 10_000_000, 0);
    let mut host = Host::new(vec![input], vec![spend_output(1_000_000)], vec![prev]);
    let mut ui = RecordingUi {
        reject_fee: true,
        ..Default::default()
    };

    let err = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::FeeCancelled));
    assert_eq!(err.kind(), FailureKind::ActionCancelled);
    assert!(ui.tx_prompts.is_empty());
}

#[test]
fn user_rejection_cancels() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    let mut host = Host::new(vec![input], vec![spend_output(90_000)], vec![prev]);
    let mut ui = RecordingUi {
        reject_tx: true,
        ..Default::default()
    };

    let err = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::Cancelled));
    assert_eq!(err.kind(), FailureKind::ActionCancelled);
    assert_eq!(ui.signing_shown, 0);
}

#[test]
fn unexpected_message_aborts() {
    let keys = TestKeys::new();
    let policy = StandardPolicy::new(&keys);
    let mut ui = RecordingUi::default();
    let (mut signer, first) =
        Signer::new(options(1, 1), &coins::BITCOIN, &keys, &policy, &mut ui).unwrap();
    assert_eq!(first.request_type, RequestType::Input);

    let err = signer.advance(TxAck::Output(spend_output(1))).unwrap_err();
    assert!(matches!(err, SignError::UnexpectedMessage));
    assert_eq!(err.kind(), FailureKind::UnexpectedMessage);

    // the session is dead now
    let err = signer.advance(TxAck::Output(spend_output(1))).unwrap_err();
    assert!(matches!(err, SignError::NotSigning));
}

#[test]
fn session_rejects_messages_after_finish() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    let mut host = Host::new(vec![input], vec![spend_output(90_000)], vec![prev]);
    let mut ui = RecordingUi::default();
    let policy = StandardPolicy::new(&keys);
    let (mut signer, first) =
        Signer::new(options(1, 1), &coins::BITCOIN, &keys, &policy, &mut ui).unwrap();
    drive(&mut signer, &mut host, first).unwrap();

    let err = signer.advance(TxAck::Output(spend_output(1))).unwrap_err();
    assert!(matches!(err, SignError::NotSigning));
    assert_eq!(err.to_string(), "Not in Signing mode");
}

// ---- multisig ----

fn multisig_fixture(keys: &TestKeys, path: &[u32]) -> MultisigInfo {
    let our_key = keys.derive(path).unwrap();
    let mut other_a = [0x11u8; 33];
    other_a[0] = 0x02;
    let mut other_b = [0x22u8; 33];
    other_b[0] = 0x03;
    MultisigInfo::new(
        2,
        vec![
            CompressedPubkey(other_a),
            CompressedPubkey(our_key.pubkey()),
            CompressedPubkey(other_b),
        ],
    )
}

#[test]
fn multisig_change_and_signature_slotting() {
    let keys = TestKeys::new();
    let descriptor = multisig_fixture(&keys, &[9, 0]);

    // fund the multisig input with an arbitrary prev output
    let prev = make_prev_tx(vec![TxOut::new(80_000u64, ScriptPubkey::new(vec![0x51]))]);
    let input = InputMsg {
        address_n: vec![9, 0],
        prev_hash: prev.txid,
        prev_index: 0,
        sequence: Some(0xffff_ffff),
        script_type: InputScriptType::SpendMultisig,
        multisig: Some(descriptor.clone()),
        ..Default::default()
    };

    let change = OutputMsg {
        amount: 20_000,
        script_type: OutputScriptType::PayToMultisig,
        multisig: Some(descriptor.clone()),
        ..Default::default()
    };
    let outputs = vec![spend_output(55_000), change];
    let mut host = Host::new(vec![input], outputs, vec![prev]);
    let mut ui = RecordingUi::default();

    let outcome = run_session(&coins::BITCOIN, options(1, 2), &mut host, &mut ui).unwrap();
    assert_eq!(outcome.signatures.len(), 1);
    // change excluded from the confirmed total: 80_000 - 20_000
    assert_eq!(ui.tx_prompts[0].0, "0.0006 BTC");

    // the emitted script sig opens with OP_0 and ends with the pushed
    // redeem script
    let redeem = descriptor.redeem_script().unwrap();
    let script_start = 4 + 1 + 36;
    let script_len = outcome.serialized[script_start] as usize;
    let script = &outcome.serialized[script_start + 1..script_start + 1 + script_len];
    assert_eq!(script[0], 0x00);
    assert_eq!(&script[script.len() - redeem.len()..], redeem.items());
}

#[test]
fn multisig_unknown_pubkey_aborts() {
    let keys = TestKeys::new();
    // descriptor that does not contain the key at the signing path
    let descriptor = multisig_fixture(&keys, &[9, 9]);

    let prev = make_prev_tx(vec![TxOut::new(80_000u64, ScriptPubkey::new(vec![0x51]))]);
    let input = InputMsg {
        address_n: vec![9, 0],
        prev_hash: prev.txid,
        prev_index: 0,
        sequence: Some(0xffff_ffff),
        script_type: InputScriptType::SpendMultisig,
        multisig: Some(descriptor),
        ..Default::default()
    };
    let mut host = Host::new(vec![input], vec![spend_output(70_000)], vec![prev]);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::PubkeyNotFound));
    assert_eq!(err.to_string(), "Pubkey not found in multisig script");
}

#[test]
fn forkid_input_without_amount_aborts() {
    let keys = TestKeys::new();
    let (input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    let mut host = Host::new(vec![input], vec![spend_output(90_000)], vec![prev]);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN_CASH, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::ForkidWithoutAmount));
}

#[test]
fn forkid_amount_above_funds_aborts() {
    let keys = TestKeys::new();
    let (mut input, prev) = funded_input(&keys, vec![0, 1], 100_000, 0);
    // host asserts more than the verified previous output provides
    input.amount = Some(150_000);
    let mut host = Host::new(vec![input], vec![spend_output(90_000)], vec![prev]);
    let mut ui = RecordingUi::default();

    let err = run_session(&coins::BITCOIN_CASH, options(1, 1), &mut host, &mut ui).unwrap_err();
    assert!(matches!(err, SignError::TxChanged));
}
