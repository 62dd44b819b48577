//! Script assembly primitives.
//!
//! Only the handful of templates the engine emits: P2PKH and P2SH output
//! scripts, and the `<sig> <pubkey>` signature script for single-sig
//! inputs. Multisig templates live in [`crate::multisig`].

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::{ScriptPubkey, ScriptSig};

/// Push an empty array / numerical 0.
pub const OP_0: u8 = 0x00;
/// Duplicate the top stack item.
pub const OP_DUP: u8 = 0x76;
/// RIPEMD160(SHA256(x)) of the top stack item.
pub const OP_HASH160: u8 = 0xa9;
/// Equality check.
pub const OP_EQUAL: u8 = 0x87;
/// Equality check, fail the script on mismatch.
pub const OP_EQUALVERIFY: u8 = 0x88;
/// Signature check.
pub const OP_CHECKSIG: u8 = 0xac;
/// m-of-n signature check.
pub const OP_CHECKMULTISIG: u8 = 0xae;
/// Push the number 1; `OP_1 + n - 1` pushes small number n.
pub const OP_1: u8 = 0x51;

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

/// RIPEMD160(SHA256(data)), the script-hash primitive.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// Append a minimal push of `data` to `buf`.
pub fn push_data(buf: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0..=0x4b => buf.push(data.len() as u8),
        0x4c..=0xff => {
            buf.push(OP_PUSHDATA1);
            buf.push(data.len() as u8);
        }
        _ => {
            buf.push(OP_PUSHDATA2);
            buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
        }
    }
    buf.extend_from_slice(data);
}

/// The standard pay-to-pubkey-hash locking script.
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> ScriptPubkey {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script.into()
}

/// The standard pay-to-script-hash locking script.
pub fn p2sh_script(script_hash: &[u8; 20]) -> ScriptPubkey {
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, 20]);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script.into()
}

/// The `<sig> <pubkey>` signature script spending a P2PKH output. The
/// signature bytes must already carry their trailing sighash byte.
pub fn p2pkh_sig_script(sig_with_sighash: &[u8], pubkey: &[u8; 33]) -> ScriptSig {
    let mut script = Vec::with_capacity(sig_with_sighash.len() + 35);
    push_data(&mut script, sig_with_sighash);
    push_data(&mut script, pubkey);
    script.into()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_builds_p2pkh_scripts() {
        let h: [u8; 20] = hex::decode("bc3b654dca7e56b04dca18f2566cdaf02e8d9ada")
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(
            hex::encode(p2pkh_script(&h).items()),
            "76a914bc3b654dca7e56b04dca18f2566cdaf02e8d9ada88ac"
        );
        assert_eq!(
            hex::encode(p2sh_script(&h).items()),
            "a914bc3b654dca7e56b04dca18f2566cdaf02e8d9ada87"
        );
    }

    #[test]
    fn it_pushes_minimally() {
        let mut buf = vec![];
        push_data(&mut buf, &[0xaa; 3]);
        assert_eq!(buf, vec![3, 0xaa, 0xaa, 0xaa]);

        let mut buf = vec![];
        push_data(&mut buf, &[0xbb; 0x60]);
        assert_eq!(&buf[..2], &[OP_PUSHDATA1, 0x60]);
        assert_eq!(buf.len(), 0x62);

        let mut buf = vec![];
        push_data(&mut buf, &[0xcc; 0x123]);
        assert_eq!(&buf[..3], &[OP_PUSHDATA2, 0x23, 0x01]);
        assert_eq!(buf.len(), 0x126);
    }

    #[test]
    fn it_hashes_pubkeys() {
        // hash160 of the empty string is well known
        assert_eq!(
            hex::encode(hash160(b"")),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );
    }
}
