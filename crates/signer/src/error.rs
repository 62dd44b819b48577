//! Session errors. Every error is fatal: the engine wipes its state before
//! surfacing one, and the driver must report a single failure message and
//! drop the session.

use thiserror::Error;

use crate::keys::KeyError;
use crate::policy::{ExchangeError, PolicyError};
use streamsign_core::ser::SerError;

/// Failure classification for the outer message layer, mirroring the
/// device's failure codes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// A message arrived that the current state cannot accept.
    UnexpectedMessage,
    /// The outputs spend more than the inputs provide.
    NotEnoughFunds,
    /// The user rejected a confirmation.
    ActionCancelled,
    /// Everything else.
    Other,
}

/// A fatal signing-session error.
#[derive(Debug, Error)]
pub enum SignError {
    /// A message arrived outside an active session.
    #[error("Not in Signing mode")]
    NotSigning,

    /// A message arrived that the current stage cannot accept.
    #[error("Unexpected message")]
    UnexpectedMessage,

    /// A streamed previous transaction does not hash to the prevout txid
    /// the input claimed.
    #[error("Encountered invalid prevhash")]
    InvalidPrevHash,

    /// Phase-two data differs from what the user confirmed in phase one.
    #[error("Transaction has changed during signing")]
    TxChanged,

    /// Outputs exceed inputs.
    #[error("Not enough funds")]
    NotEnoughFunds,

    /// A second output classified as change.
    #[error("Only one change output allowed")]
    OnlyOneChange,

    /// The user rejected the fee prompt.
    #[error("Fee over threshold. Signing cancelled.")]
    FeeCancelled,

    /// The user rejected the final confirmation.
    #[error("Signing cancelled by user")]
    Cancelled,

    /// A multisig descriptor could not be fingerprinted.
    #[error("Error computing multisig fingerprint")]
    MultisigFingerprint,

    /// A multisig input arrived without its descriptor.
    #[error("Multisig info not provided")]
    MissingMultisig,

    /// The signing pubkey does not appear in the multisig descriptor.
    #[error("Pubkey not found in multisig script")]
    PubkeyNotFound,

    /// The input's previous-output script could not be reconstructed.
    #[error("Failed to compile input")]
    InputCompile,

    /// The multisig signature script could not be assembled.
    #[error("Failed to serialize multisig script")]
    MultisigSerialize,

    /// A fork-id coin input arrived without its amount.
    #[error("SIGHASH_FORKID input without amount")]
    ForkidWithoutAmount,

    /// An output's claimed destination kind is missing required fields.
    #[error("Invalid output address type")]
    InvalidAddressKind,

    /// An input could not be added to a transaction stream.
    #[error("Failed to serialize input")]
    SerializeInput,

    /// An output could not be added to a transaction stream.
    #[error("Failed to serialize output")]
    SerializeOutput,

    /// An amount sum left u64 range.
    #[error("Amount overflow")]
    AmountOverflow,

    /// Output compilation failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Key derivation or signing failed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Serialization plumbing failed.
    #[error(transparent)]
    Ser(#[from] SerError),

    /// An internal invariant broke.
    #[error("Signing error")]
    Internal,
}

impl SignError {
    /// Map to the failure code reported to the host.
    pub fn kind(&self) -> FailureKind {
        match self {
            SignError::NotSigning | SignError::UnexpectedMessage => FailureKind::UnexpectedMessage,
            SignError::NotEnoughFunds => FailureKind::NotEnoughFunds,
            SignError::FeeCancelled | SignError::Cancelled => FailureKind::ActionCancelled,
            SignError::Policy(PolicyError::Cancelled) => FailureKind::ActionCancelled,
            SignError::Policy(PolicyError::Exchange(ExchangeError::Cancelled)) => {
                FailureKind::ActionCancelled
            }
            _ => FailureKind::Other,
        }
    }
}
