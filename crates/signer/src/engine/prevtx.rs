//! Structured-mode verification of a previous transaction.
//!
//! The host replays the transaction one piece at a time; every piece goes
//! straight into a hashing serializer and is then forgotten. When the
//! stream completes, the recomputed txid must equal the prevout hash the
//! current input claimed.

use streamsign_core::hashes::{ct_eq_32, Hash256Writer};

use crate::error::SignError;
use crate::hashes::TXID;
use crate::proto::{InputMsg, TxMeta};
use crate::stream::TxStream;
use crate::types::TxOut;

/// Compare a recomputed txid to the one an input claimed. Mismatch is
/// fatal: the host streamed a transaction it is not spending.
pub(crate) fn check_prev_hash(computed: &TXID, claimed: &TXID) -> Result<(), SignError> {
    if ct_eq_32(&computed.0, &claimed.0) {
        Ok(())
    } else {
        Err(SignError::InvalidPrevHash)
    }
}

pub(crate) struct PrevTxVerifier {
    stream: TxStream<Hash256Writer>,
}

impl PrevTxVerifier {
    pub fn new(meta: &TxMeta) -> Self {
        Self {
            stream: TxStream::new(
                Hash256Writer::default(),
                meta.version,
                meta.inputs_count,
                meta.outputs_count,
                meta.lock_time,
            ),
        }
    }

    pub fn inputs_len(&self) -> u32 {
        self.stream.inputs_len()
    }

    pub fn outputs_len(&self) -> u32 {
        self.stream.outputs_len()
    }

    pub fn add_input(&mut self, input: &InputMsg) -> Result<(), SignError> {
        self.stream
            .write_input(&input.outpoint(), &input.script_sig, input.sequence())
            .map_err(|_| SignError::SerializeInput)
    }

    pub fn add_output(&mut self, output: &TxOut) -> Result<(), SignError> {
        self.stream
            .write_output(output)
            .map_err(|_| SignError::SerializeOutput)
    }

    /// Finalize the stream and check the txid.
    pub fn verify(self, claimed: &TXID) -> Result<(), SignError> {
        let computed: TXID = self
            .stream
            .finish_marked()
            .map_err(|_| SignError::Internal)?;
        check_prev_hash(&computed, claimed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{ScriptPubkey, ScriptSig};
    use streamsign_core::ser::ByteFormat;

    fn sample_meta() -> TxMeta {
        TxMeta {
            version: 1,
            lock_time: 0,
            inputs_count: 1,
            outputs_count: 1,
        }
    }

    fn sample_input() -> InputMsg {
        InputMsg {
            prev_hash: TXID::deserialize_hex(
                "fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edbd4a38002205ab9fa7",
            )
            .unwrap(),
            prev_index: 3,
            script_sig: ScriptSig::new(vec![0xab; 4]),
            sequence: Some(0xffff_ffff),
            ..Default::default()
        }
    }

    #[test]
    fn it_recomputes_and_checks_the_txid() {
        let output = TxOut::new(100_000u64, ScriptPubkey::new(vec![0x51]));

        // hash the same transaction independently to learn its txid
        let input = sample_input();
        let mut hasher = TxStream::new(Hash256Writer::default(), 1, 1, 1, 0);
        hasher
            .write_input(&input.outpoint(), &input.script_sig, input.sequence())
            .unwrap();
        hasher.write_output(&output).unwrap();
        let txid: TXID = hasher.finish_marked().unwrap();

        let mut verifier = PrevTxVerifier::new(&sample_meta());
        verifier.add_input(&input).unwrap();
        verifier.add_output(&output).unwrap();
        assert!(verifier.verify(&txid).is_ok());

        let mut verifier = PrevTxVerifier::new(&sample_meta());
        verifier.add_input(&input).unwrap();
        verifier.add_output(&output).unwrap();
        match verifier.verify(&TXID::default()) {
            Err(SignError::InvalidPrevHash) => {}
            _ => panic!("expected invalid prevhash"),
        }
    }

    #[test]
    fn it_rejects_overlong_streams() {
        let mut verifier = PrevTxVerifier::new(&sample_meta());
        verifier.add_input(&sample_input()).unwrap();
        match verifier.add_input(&sample_input()) {
            Err(SignError::SerializeInput) => {}
            _ => panic!("expected serialize failure"),
        }
    }
}
