//! Change-output classification.
//!
//! An output is change when it demonstrably pays back into the wallet that
//! funds the transaction: either it is a multisig output carrying the same
//! descriptor fingerprint as every input, or it pays a derived address and
//! the host marked it as change (or left the kind unstated).

use streamsign_core::hashes::{ct_eq_32, Hash256Digest};

use crate::error::SignError;
use crate::proto::{AddressKind, OutputMsg, OutputScriptType};

/// Classify one output. `wallet_fp` is the shared input fingerprint, when
/// every input carried the same one. Destination kinds with missing
/// required fields are fatal.
pub(crate) fn classify(
    out: &OutputMsg,
    wallet_fp: Option<&Hash256Digest>,
) -> Result<bool, SignError> {
    if out.script_type == OutputScriptType::PayToMultisig {
        if let (Some(multisig), Some(wallet_fp)) = (out.multisig.as_ref(), wallet_fp) {
            let fingerprint = multisig
                .fingerprint()
                .ok_or(SignError::MultisigFingerprint)?;
            return Ok(ct_eq_32(&fingerprint, wallet_fp));
        }
    }

    match out.address_type {
        Some(kind) => {
            let valid = match kind {
                AddressKind::Spend => out.address.is_some(),
                AddressKind::Transfer | AddressKind::Change => !out.address_n.is_empty(),
                AddressKind::Exchange => out.exchange_data.is_some(),
            };
            if !valid {
                return Err(SignError::InvalidAddressKind);
            }
            Ok(out.script_type == OutputScriptType::PayToAddress
                && !out.address_n.is_empty()
                && kind == AddressKind::Change)
        }
        None => {
            Ok(out.script_type == OutputScriptType::PayToAddress && !out.address_n.is_empty())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::multisig::{CompressedPubkey, MultisigInfo};

    fn multisig() -> MultisigInfo {
        let mut key = [0x11u8; 33];
        key[0] = 0x02;
        MultisigInfo::new(1, vec![CompressedPubkey(key)])
    }

    #[test]
    fn it_detects_path_change() {
        let out = OutputMsg {
            address_n: vec![0, 1],
            address_type: Some(AddressKind::Change),
            ..Default::default()
        };
        assert!(classify(&out, None).unwrap());

        // unstated kind counts as change too
        let out = OutputMsg {
            address_n: vec![0, 1],
            ..Default::default()
        };
        assert!(classify(&out, None).unwrap());

        // a spend to an external address is not change
        let out = OutputMsg {
            address: Some("x".into()),
            address_type: Some(AddressKind::Spend),
            ..Default::default()
        };
        assert!(!classify(&out, None).unwrap());
    }

    #[test]
    fn it_requires_kind_fields() {
        let out = OutputMsg {
            address_type: Some(AddressKind::Spend),
            ..Default::default()
        };
        match classify(&out, None) {
            Err(SignError::InvalidAddressKind) => {}
            _ => panic!("expected invalid address kind"),
        }

        let out = OutputMsg {
            address_type: Some(AddressKind::Change),
            ..Default::default()
        };
        assert!(classify(&out, None).is_err());
    }

    #[test]
    fn it_matches_multisig_fingerprints() {
        let ms = multisig();
        let fp = ms.fingerprint().unwrap();
        let out = OutputMsg {
            script_type: OutputScriptType::PayToMultisig,
            multisig: Some(ms),
            ..Default::default()
        };
        assert!(classify(&out, Some(&fp)).unwrap());
        assert!(!classify(&out, Some(&[0u8; 32])).unwrap());
        // without a shared input fingerprint, multisig outputs are external
        assert!(!classify(&out, None).unwrap());
    }
}
