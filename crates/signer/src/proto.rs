//! Typed messages exchanged with the host.
//!
//! The engine pulls: every [`TxRequest`] names exactly the piece of data it
//! wants next, and the host answers with exactly one [`TxAck`]. The wire
//! codec that frames these is external; everything here is serde-friendly
//! so any codec can carry it.

use crate::hashes::TXID;
use crate::multisig::MultisigInfo;
use crate::types::{Outpoint, ScriptSig, TxOut};

/// The sequence used when an input does not carry one explicitly. Keeps
/// the two protocol phases and the sequence commitment self-consistent.
pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;

/// What the engine is asking for.
#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestType {
    /// An input, of the current transaction or of the previous transaction
    /// named in `tx_hash`.
    Input,
    /// An output, of the current transaction or of the previous
    /// transaction named in `tx_hash`.
    Output,
    /// Counts, version, and locktime of the previous transaction named in
    /// `tx_hash`. The host may answer with the structured metadata or by
    /// streaming the raw serialized bytes.
    Meta,
    /// Nothing: the session completed.
    Finished,
}

/// Which item a request refers to.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestDetails {
    /// Index of the requested input or output.
    pub request_index: Option<u32>,
    /// Set when the request refers to a previous transaction.
    pub tx_hash: Option<TXID>,
}

/// A fragment of the signed transaction, attached to a request once phase
/// two starts producing output.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, Eq, PartialEq)]
pub struct SerializedChunk {
    /// Which input the attached signature belongs to.
    pub signature_index: Option<u32>,
    /// DER signature, without sighash suffix.
    pub signature: Option<Vec<u8>>,
    /// The next bytes of the serialized signed transaction.
    pub serialized_tx: Vec<u8>,
}

/// A request to the host.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct TxRequest {
    /// What is being requested.
    pub request_type: RequestType,
    /// Which item is being requested.
    pub details: RequestDetails,
    /// Any signed bytes produced by the step that issued this request.
    pub serialized: Option<SerializedChunk>,
}

impl TxRequest {
    /// Request input `idx` of the current transaction.
    pub fn input(idx: u32) -> Self {
        Self {
            request_type: RequestType::Input,
            details: RequestDetails {
                request_index: Some(idx),
                tx_hash: None,
            },
            serialized: None,
        }
    }

    /// Request output `idx` of the current transaction.
    pub fn output(idx: u32) -> Self {
        Self {
            request_type: RequestType::Output,
            details: RequestDetails {
                request_index: Some(idx),
                tx_hash: None,
            },
            serialized: None,
        }
    }

    /// Request the metadata of previous transaction `tx_hash`.
    pub fn prev_meta(tx_hash: TXID) -> Self {
        Self {
            request_type: RequestType::Meta,
            details: RequestDetails {
                request_index: None,
                tx_hash: Some(tx_hash),
            },
            serialized: None,
        }
    }

    /// Request input `idx` of previous transaction `tx_hash`.
    pub fn prev_input(idx: u32, tx_hash: TXID) -> Self {
        Self {
            request_type: RequestType::Input,
            details: RequestDetails {
                request_index: Some(idx),
                tx_hash: Some(tx_hash),
            },
            serialized: None,
        }
    }

    /// Request output `idx` of previous transaction `tx_hash`.
    pub fn prev_output(idx: u32, tx_hash: TXID) -> Self {
        Self {
            request_type: RequestType::Output,
            details: RequestDetails {
                request_index: Some(idx),
                tx_hash: Some(tx_hash),
            },
            serialized: None,
        }
    }

    /// Signal completion.
    pub fn finished() -> Self {
        Self {
            request_type: RequestType::Finished,
            details: RequestDetails::default(),
            serialized: None,
        }
    }

    /// Attach a serialized fragment to this request.
    pub fn with_serialized(mut self, chunk: SerializedChunk) -> Self {
        self.serialized = Some(chunk);
        self
    }
}

/// How an input authorizes its spend.
#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputScriptType {
    /// Single-signature P2PKH spend.
    SpendAddress,
    /// m-of-n multisig spend via P2SH.
    SpendMultisig,
}

/// An input as described by the host. Used both for inputs of the current
/// transaction (where `script_sig` is empty and `address_n` names the
/// signing key) and for inputs of a streamed previous transaction (where
/// `script_sig` carries that transaction's actual signature script).
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct InputMsg {
    /// Derivation path of the key that owns this input.
    pub address_n: Vec<u32>,
    /// TXID of the transaction whose output is being spent.
    pub prev_hash: TXID,
    /// Index of the output being spent.
    pub prev_index: u32,
    /// Signature script; only populated on previous-transaction inputs.
    pub script_sig: ScriptSig,
    /// Sequence; `DEFAULT_SEQUENCE` when absent.
    pub sequence: Option<u32>,
    /// Spend authorization shape.
    pub script_type: InputScriptType,
    /// Multisig descriptor, for `SpendMultisig` inputs.
    pub multisig: Option<MultisigInfo>,
    /// The amount this input spends. Required on fork-id coins.
    pub amount: Option<u64>,
}

impl InputMsg {
    /// The outpoint this input consumes.
    pub fn outpoint(&self) -> Outpoint {
        Outpoint::new(self.prev_hash, self.prev_index)
    }

    /// The effective sequence.
    pub fn sequence(&self) -> u32 {
        self.sequence.unwrap_or(DEFAULT_SEQUENCE)
    }
}

impl Default for InputMsg {
    fn default() -> Self {
        Self {
            address_n: vec![],
            prev_hash: TXID::default(),
            prev_index: 0,
            script_sig: ScriptSig::null(),
            sequence: None,
            script_type: InputScriptType::SpendAddress,
            multisig: None,
            amount: None,
        }
    }
}

/// Destination shape of an output.
#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputScriptType {
    /// Pay to a base58 address or to a derived key.
    PayToAddress,
    /// Pay to a script hash address.
    PayToScriptHash,
    /// Pay to an m-of-n multisig script (P2SH-wrapped).
    PayToMultisig,
}

/// What kind of destination the host claims this output is. Constrains
/// which fields must be present and feeds change detection.
#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressKind {
    /// An external payment; requires `address`.
    Spend,
    /// A transfer into this wallet; requires a derivation path.
    Transfer,
    /// Change back to this wallet; requires a derivation path.
    Change,
    /// An exchange contract output; requires exchange data.
    Exchange,
}

/// An output of the current transaction, in abstract form. The output
/// policy compiles this into a [`TxOut`].
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct OutputMsg {
    /// Destination base58check address, for `Spend` outputs.
    pub address: Option<String>,
    /// Derivation path, for outputs paying back into this wallet.
    pub address_n: Vec<u32>,
    /// Amount in the coin's minor unit.
    pub amount: u64,
    /// Destination script shape.
    pub script_type: OutputScriptType,
    /// Destination kind claimed by the host.
    pub address_type: Option<AddressKind>,
    /// Multisig descriptor for `PayToMultisig` outputs.
    pub multisig: Option<MultisigInfo>,
    /// Opaque exchange contract payload, validated externally.
    pub exchange_data: Option<Vec<u8>>,
}

impl Default for OutputMsg {
    fn default() -> Self {
        Self {
            address: None,
            address_n: vec![],
            amount: 0,
            script_type: OutputScriptType::PayToAddress,
            address_type: None,
            multisig: None,
            exchange_data: None,
        }
    }
}

/// Counts, version, and locktime of a previous transaction.
#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TxMeta {
    /// Transaction version.
    pub version: u32,
    /// Transaction locktime.
    pub lock_time: u32,
    /// Number of inputs.
    pub inputs_count: u32,
    /// Number of outputs.
    pub outputs_count: u32,
}

/// The host's answer to a request.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Eq, PartialEq)]
pub enum TxAck {
    /// An input of the current or a previous transaction.
    Input(InputMsg),
    /// An output of the current transaction, in abstract form.
    Output(OutputMsg),
    /// An output of a previous transaction, already compiled.
    BinOutput(TxOut),
    /// Previous-transaction metadata.
    Meta(TxMeta),
    /// A chunk of a previous transaction's raw serialized bytes. Answers a
    /// `Meta` request when the host has no structured representation.
    Raw(Vec<u8>),
}
