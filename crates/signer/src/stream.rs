//! A streaming transaction serializer.
//!
//! The engine never holds a whole transaction. Instead it pushes inputs and
//! outputs one at a time through a [`TxStream`], which lays down consensus
//! serialization (version, counts, inputs, outputs, locktime) into whatever
//! `Write` sink backs it. Three sinks are used:
//!
//! - a [`Hash256Writer`] recomputing a previous transaction's txid,
//! - a [`Hash256Writer`] accumulating the legacy signature digest,
//! - a `Vec<u8>` building the outbound signed transaction, drained one
//!   fragment at a time.

use std::io::Write;

use streamsign_core::{
    hashes::{Hash256Digest, Hash256Writer, MarkedDigest, MarkedDigestWriter},
    ser::{write_compact_int, ByteFormat, SerError, SerResult},
};

use crate::types::{Outpoint, ScriptSig, TxOut};

/// Serializes a transaction incrementally into `W`. Declared counts are
/// enforced: the version and input count are emitted before the first
/// input, the output count before the first output, and the locktime after
/// the last output. A transaction must declare at least one output or the
/// locktime is never reached.
pub struct TxStream<W: Write> {
    writer: W,
    version: u32,
    lock_time: u32,
    inputs_len: u32,
    outputs_len: u32,
    inputs_seen: u32,
    outputs_seen: u32,
}

impl<W: Write> TxStream<W> {
    /// Start a new serialization with the declared shape.
    pub fn new(writer: W, version: u32, inputs_len: u32, outputs_len: u32, lock_time: u32) -> Self {
        Self {
            writer,
            version,
            lock_time,
            inputs_len,
            outputs_len,
            inputs_seen: 0,
            outputs_seen: 0,
        }
    }

    /// Number of inputs declared at construction.
    pub fn inputs_len(&self) -> u32 {
        self.inputs_len
    }

    /// Number of outputs declared at construction.
    pub fn outputs_len(&self) -> u32 {
        self.outputs_len
    }

    /// True once every declared input and output has been written.
    pub fn is_complete(&self) -> bool {
        self.inputs_seen == self.inputs_len && self.outputs_seen == self.outputs_len
    }

    /// The version and input count, ahead of the first input (or of the
    /// output count, for an input-less transaction).
    fn write_shape_prefix(&mut self) -> SerResult<()> {
        self.writer.write_all(&self.version.to_le_bytes())?;
        write_compact_int(&mut self.writer, self.inputs_len as u64)?;
        Ok(())
    }

    /// Serialize one input. Emits the version and input count ahead of the
    /// first one.
    pub fn write_input(
        &mut self,
        outpoint: &Outpoint,
        script_sig: &ScriptSig,
        sequence: u32,
    ) -> SerResult<()> {
        if self.inputs_seen >= self.inputs_len {
            return Err(SerError::ComponentError("input past declared count".into()));
        }
        if self.inputs_seen == 0 {
            self.write_shape_prefix()?;
        }
        outpoint.write_to(&mut self.writer)?;
        script_sig.write_to(&mut self.writer)?;
        self.writer.write_all(&sequence.to_le_bytes())?;
        self.inputs_seen += 1;
        Ok(())
    }

    /// Serialize one output. Emits the output count ahead of the first one
    /// and the locktime after the last.
    pub fn write_output(&mut self, output: &TxOut) -> SerResult<()> {
        if self.inputs_seen < self.inputs_len || self.outputs_seen >= self.outputs_len {
            return Err(SerError::ComponentError(
                "output outside declared shape".into(),
            ));
        }
        if self.outputs_seen == 0 {
            if self.inputs_len == 0 {
                self.write_shape_prefix()?;
            }
            write_compact_int(&mut self.writer, self.outputs_len as u64)?;
        }
        output.write_to(&mut self.writer)?;
        self.outputs_seen += 1;
        if self.outputs_seen == self.outputs_len {
            self.writer.write_all(&self.lock_time.to_le_bytes())?;
        }
        Ok(())
    }
}

impl TxStream<Hash256Writer> {
    /// Double-SHA-256 of the complete serialization, as a marked digest.
    pub fn finish_marked<M: MarkedDigest>(self) -> SerResult<M> {
        if !self.is_complete() {
            return Err(SerError::ComponentError("incomplete transaction".into()));
        }
        Ok(self.writer.finish_marked())
    }

    /// Append a 4-byte sighash word, then double-SHA-256. This is the
    /// legacy signature digest.
    pub fn finish_with_sighash(mut self, hash_type: u32) -> SerResult<Hash256Digest> {
        if !self.is_complete() {
            return Err(SerError::ComponentError("incomplete transaction".into()));
        }
        self.writer.write_all(&hash_type.to_le_bytes())?;
        Ok(self.writer.finish())
    }
}

impl TxStream<Vec<u8>> {
    /// Drain the bytes written since the last call. Each drained fragment
    /// is handed to the host as a `serialized_tx` chunk.
    pub fn take_fragment(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.writer)
    }
}

/// Worst-case serialized size estimate in bytes: a signed P2PKH input
/// costs up to 149 bytes, an output up to 35, plus 10 bytes of framing.
pub fn estimate_size(inputs_len: u32, outputs_len: u32) -> u32 {
    10 + inputs_len * 149 + outputs_len * 35
}

/// [`estimate_size`] rounded up to whole kilobytes, for fee ceilings
/// quoted per kB.
pub fn estimate_size_kb(inputs_len: u32, outputs_len: u32) -> u32 {
    (estimate_size(inputs_len, outputs_len) + 999) / 1000
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hashes::TXID;
    use crate::types::ScriptPubkey;
    use streamsign_core::ser::ByteFormat;

    // mainnet 03ee4f7a4e68f802303bc659f8f817964b4b74fe046facc3ae1be4679d622c45
    static TX_HEX: &str = "0100000001813f79011acb80925dfe69b3def355fe914bd1d96a3f5f71bf8303c6a989c7d1000000006b483045022100ed81ff192e75a3fd2304004dcadb746fa5e24c5031ccfcf21320b0277457c98f02207a986d955c6e0cb35d446a89d3f56100f4d7f67801c31967743a9c8e10615bed01210349fc4e631e3624a545de3f89f5d8684c7b8138bd94bdd531d2e213bf016b278afeffffff02a135ef01000000001976a914bc3b654dca7e56b04dca18f2566cdaf02e8d9ada88ac99c39800000000001976a9141c4bc762dd5423e332166702cb75f40df79fea1288ac19430600";

    fn fixture_parts() -> (Outpoint, ScriptSig, u32, Vec<TxOut>, u32, u32) {
        let outpoint = Outpoint::deserialize_hex(
            "813f79011acb80925dfe69b3def355fe914bd1d96a3f5f71bf8303c6a989c7d100000000",
        )
        .unwrap();
        let script_sig = ScriptSig::deserialize_hex(
            "6b483045022100ed81ff192e75a3fd2304004dcadb746fa5e24c5031ccfcf21320b0277457c98f02207a986d955c6e0cb35d446a89d3f56100f4d7f67801c31967743a9c8e10615bed01210349fc4e631e3624a545de3f89f5d8684c7b8138bd94bdd531d2e213bf016b278a",
        )
        .unwrap();
        let outputs = vec![
            TxOut::new(
                0x01ef_35a1u64,
                hex::decode("76a914bc3b654dca7e56b04dca18f2566cdaf02e8d9ada88ac").unwrap(),
            ),
            TxOut::new(
                0x0098_c399u64,
                hex::decode("76a9141c4bc762dd5423e332166702cb75f40df79fea1288ac").unwrap(),
            ),
        ];
        (outpoint, script_sig, 0xffff_fffe, outputs, 1, 0x0006_4319)
    }

    #[test]
    fn it_reproduces_consensus_serialization() {
        let (outpoint, script_sig, sequence, outputs, version, locktime) = fixture_parts();
        let mut stream = TxStream::new(vec![], version, 1, 2, locktime);
        stream.write_input(&outpoint, &script_sig, sequence).unwrap();
        for output in outputs.iter() {
            stream.write_output(output).unwrap();
        }
        assert!(stream.is_complete());
        assert_eq!(hex::encode(stream.take_fragment()), TX_HEX);
    }

    #[test]
    fn it_recomputes_the_txid() {
        let (outpoint, script_sig, sequence, outputs, version, locktime) = fixture_parts();
        let mut stream = TxStream::new(Hash256Writer::default(), version, 1, 2, locktime);
        stream.write_input(&outpoint, &script_sig, sequence).unwrap();
        for output in outputs.iter() {
            stream.write_output(output).unwrap();
        }
        let txid: TXID = stream.finish_marked().unwrap();
        assert_eq!(
            txid,
            TXID::from_be_hex("03ee4f7a4e68f802303bc659f8f817964b4b74fe046facc3ae1be4679d622c45")
                .unwrap()
        );
    }

    #[test]
    fn it_rejects_out_of_shape_writes() {
        let mut stream = TxStream::new(vec![], 1, 1, 1, 0);
        let out = TxOut::new(1u64, ScriptPubkey::null());
        // output before the declared input
        assert!(stream.write_output(&out).is_err());
        stream
            .write_input(&Outpoint::null(), &ScriptSig::null(), 0xffff_ffff)
            .unwrap();
        assert!(stream
            .write_input(&Outpoint::null(), &ScriptSig::null(), 0xffff_ffff)
            .is_err());
        stream.write_output(&out).unwrap();
        assert!(stream.write_output(&out).is_err());
    }

    #[test]
    fn it_estimates_sizes() {
        assert_eq!(estimate_size(1, 1), 194);
        assert_eq!(estimate_size_kb(1, 1), 1);
        assert_eq!(estimate_size_kb(7, 2), 2);
    }
}
