//! The seam to the output policy.
//!
//! The engine hands the policy an abstract output description and gets back
//! a compiled `(amount, script_pubkey)` pair. The policy owns destination
//! validation and any per-output user confirmation; a shipped
//! [`StandardPolicy`] covers the standard templates. Exchange-contract
//! validation is an external collaborator; its error space is modeled here
//! so a real validator can slot in.

use thiserror::Error;

use crate::coins::CoinParams;
use crate::keys::{KeyError, KeySource};
use crate::proto::{AddressKind, OutputMsg, OutputScriptType};
use crate::scripts::{hash160, p2pkh_script, p2sh_script};
use crate::types::TxOut;

/// Exchange-contract validation failures, each with its own report text.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ExchangeError {
    /// The contract signature did not verify.
    #[error("Exchange signature error")]
    Signature,
    /// Deposit leg names the wrong coin.
    #[error("Exchange deposit coin type error")]
    DepositCoinType,
    /// Deposit leg names the wrong address.
    #[error("Exchange deposit address error")]
    DepositAddress,
    /// Deposit leg names the wrong amount.
    #[error("Exchange deposit amount error")]
    DepositAmount,
    /// Withdrawal leg names the wrong coin.
    #[error("Exchange withdrawal coin type error")]
    WithdrawalCoinType,
    /// Withdrawal leg names the wrong address.
    #[error("Exchange withdrawal address error")]
    WithdrawalAddress,
    /// Withdrawal leg names the wrong amount.
    #[error("Exchange withdrawal amount error")]
    WithdrawalAmount,
    /// Return leg names the wrong coin.
    #[error("Exchange return coin type error")]
    ReturnCoinType,
    /// Return leg names the wrong address.
    #[error("Exchange return address error")]
    ReturnAddress,
    /// The API key did not match.
    #[error("Exchange api key error")]
    ApiKey,
    /// The user rejected the exchange confirmation.
    #[error("Exchange transaction cancelled")]
    Cancelled,
    /// The contract uses a response format this device no longer accepts.
    #[error("Obsolete response structure error")]
    ObsoleteResponse,
}

/// Output compilation failures.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The output could not be compiled into a script.
    #[error("Failed to compile output")]
    Compile,

    /// The user rejected this output.
    #[error("Transaction cancelled")]
    Cancelled,

    /// The destination address did not decode for this coin.
    #[error("Failed to compile output: bad address")]
    Address,

    /// Exchange-contract validation failed.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// Key derivation failed while compiling a pay-to-derived-key output.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Turns an abstract output into its compiled form. `needs_confirm` is set
/// for outputs the user has not implicitly approved (i.e. everything that
/// is not change); implementations that can talk to a display should
/// confirm those and return [`PolicyError::Cancelled`] on rejection.
pub trait OutputPolicy {
    /// Compile one output.
    fn compile_output(
        &self,
        coin: &CoinParams,
        out: &OutputMsg,
        needs_confirm: bool,
    ) -> Result<TxOut, PolicyError>;
}

/// Compiles the standard templates: P2PKH by address or by derivation
/// path, P2SH by address, and P2SH-wrapped multisig. Headless: outputs
/// needing confirmation are accepted without a prompt, which suits hosts
/// that gate confirmation elsewhere.
pub struct StandardPolicy<'a, K: KeySource> {
    keys: &'a K,
}

impl<'a, K: KeySource> StandardPolicy<'a, K> {
    /// A policy deriving pay-to-path outputs from `keys`.
    pub fn new(keys: &'a K) -> Self {
        Self { keys }
    }

    fn decode_base58(coin: &CoinParams, address: &str) -> Result<(u8, [u8; 20]), PolicyError> {
        let raw = bs58::decode(address)
            .with_check(None)
            .into_vec()
            .map_err(|_| PolicyError::Address)?;
        if raw.len() != 21 {
            return Err(PolicyError::Address);
        }
        let version = raw[0];
        if version != coin.address_type && version != coin.address_type_p2sh {
            return Err(PolicyError::Address);
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&raw[1..]);
        Ok((version, hash))
    }
}

impl<'a, K: KeySource> OutputPolicy for StandardPolicy<'a, K> {
    fn compile_output(
        &self,
        coin: &CoinParams,
        out: &OutputMsg,
        _needs_confirm: bool,
    ) -> Result<TxOut, PolicyError> {
        if out.address_type == Some(AddressKind::Exchange) || out.exchange_data.is_some() {
            // no exchange validator is wired into this policy
            return Err(ExchangeError::ObsoleteResponse.into());
        }

        let script_pubkey = match out.script_type {
            OutputScriptType::PayToAddress => {
                if let Some(address) = &out.address {
                    let (version, hash) = Self::decode_base58(coin, address)?;
                    if version == coin.address_type_p2sh {
                        p2sh_script(&hash)
                    } else {
                        p2pkh_script(&hash)
                    }
                } else if !out.address_n.is_empty() {
                    let key = self.keys.derive(&out.address_n)?;
                    p2pkh_script(&key.pubkey_hash())
                } else {
                    return Err(PolicyError::Compile);
                }
            }
            OutputScriptType::PayToScriptHash => {
                let address = out.address.as_ref().ok_or(PolicyError::Compile)?;
                let (version, hash) = Self::decode_base58(coin, address)?;
                if version != coin.address_type_p2sh {
                    return Err(PolicyError::Address);
                }
                p2sh_script(&hash)
            }
            OutputScriptType::PayToMultisig => {
                let multisig = out.multisig.as_ref().ok_or(PolicyError::Compile)?;
                let redeem = multisig.redeem_script().ok_or(PolicyError::Compile)?;
                p2sh_script(&hash160(redeem.items()))
            }
        };

        Ok(TxOut::new(out.amount, script_pubkey))
    }
}
