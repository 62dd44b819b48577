//! # streamsign
//!
//! A streaming transaction signing engine for Bitcoin-family coins, built
//! for environments where the transaction being signed may be far larger
//! than available memory.
//!
//! The host drives a pull protocol: the engine names the piece of data it
//! wants next (an input, an output, a previous transaction's metadata), the
//! host answers with exactly one message, and the engine advances one step,
//! updating its rolling hashes and occasionally emitting a signed fragment.
//! Nothing larger than a single input or output is ever resident.
//!
//! Signing happens in two phases. Phase one walks every input, streams and
//! re-hashes the previous transaction each input spends (so the host cannot
//! lie about amounts), walks every output, classifies change, computes the
//! fee, and asks the user to confirm. Phase two re-requests everything,
//! recomputes a commit hash over the stream, and refuses to sign if a
//! single byte moved since the user confirmed. Signature digests are
//! computed either the legacy way (double-SHA-256 of the whole serialized
//! transaction) or via the BIP-143 pre-image for fork-id coins.
//!
//! ## Crate layout
//!
//! - [`engine`] — the eight-stage signing state machine.
//! - [`proto`] — the typed request/ack messages exchanged with the host.
//! - [`types`] + [`stream`] — transaction primitives and the streaming
//!   serializer that backs every digest.
//! - [`coins`] — coin parameter records (fork id, fee ceiling, address
//!   version bytes).
//! - [`multisig`], [`scripts`] — script assembly.
//! - [`keys`], [`policy`], [`ui`] — the seams to the key store, the output
//!   policy, and the confirmation display.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod coins;
pub mod engine;
pub mod error;
pub mod hashes;
pub mod keys;
pub mod multisig;
pub mod policy;
pub mod proto;
pub mod scripts;
pub mod stream;
pub mod types;
pub mod ui;

/// Common traits and types, re-exported for convenience.
pub mod prelude {
    pub use crate::coins::CoinParams;
    pub use crate::engine::{Signer, SignerOptions};
    pub use crate::error::{FailureKind, SignError};
    pub use crate::hashes::TXID;
    pub use crate::keys::{DerivedKey, KeySource};
    pub use crate::policy::{OutputPolicy, StandardPolicy};
    pub use crate::proto::{TxAck, TxRequest};
    pub use crate::types::*;
    pub use crate::ui::ConfirmationUi;
    pub use streamsign_core::hashes::{Hash256Writer, MarkedDigest, MarkedDigestWriter};
    pub use streamsign_core::ser::ByteFormat;
}
