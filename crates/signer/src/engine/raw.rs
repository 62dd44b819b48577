//! Byte-at-a-time parsing of a raw previous transaction.
//!
//! When the host holds only the opaque serialized bytes of a previous
//! transaction, it streams them in arbitrary chunks. Every byte is mixed
//! into the txid hash unchanged; in parallel, a small state machine tracks
//! field boundaries just closely enough to pull out the value of the one
//! output the current input references. Nothing is buffered beyond a
//! 9-byte VarInt scratch.

use std::io::Write;

use streamsign_core::{
    hashes::Hash256Writer,
    ser::{compact_int_complete, SerError},
};

use crate::error::SignError;
use crate::hashes::TXID;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum RawState {
    Version,
    InputCount,
    Inputs,
    OutputCount,
    OutputsValue,
    Outputs,
    Locktime,
    Done,
}

/// Result of feeding one chunk.
pub(crate) enum RawEvent {
    /// Mid-transaction; the host should keep streaming.
    NeedMore,
    /// Locktime completed: the recomputed txid, and the value of the
    /// referenced output (0 when the reference was out of range).
    Complete {
        txid: TXID,
        referenced_value: u64,
    },
}

pub(crate) struct RawTxParser {
    state: RawState,
    /// Bytes left in the field (or skip-span) currently being consumed.
    remaining: u64,
    var_int: [u8; 9],
    var_int_len: usize,
    inputs_len: u64,
    outputs_len: u64,
    /// Inputs or outputs fully consumed in the current sweep.
    seen: u64,
    /// Little-endian accumulator for the value of the output being read.
    value: u64,
    referenced_value: u64,
    prev_index: u64,
    hasher: Hash256Writer,
}

impl RawTxParser {
    /// A parser extracting the value of output `prev_index`.
    pub fn new(prev_index: u32) -> Self {
        Self {
            state: RawState::Version,
            remaining: 4,
            var_int: [0u8; 9],
            var_int_len: 0,
            inputs_len: 0,
            outputs_len: 0,
            seen: 0,
            value: 0,
            referenced_value: 0,
            prev_index: prev_index as u64,
            hasher: Hash256Writer::default(),
        }
    }

    /// Consume one chunk. Bytes after the locktime are ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<RawEvent, SignError> {
        for &byte in chunk {
            if self.state == RawState::Done {
                break;
            }
            self.hasher.write_all(&[byte]).map_err(SerError::from)?;
            self.step(byte);
            if self.state == RawState::Done {
                let txid = std::mem::take(&mut self.hasher).finish_marked();
                return Ok(RawEvent::Complete {
                    txid,
                    referenced_value: self.referenced_value,
                });
            }
        }
        Ok(RawEvent::NeedMore)
    }

    fn reset_var_int(&mut self) {
        self.var_int = [0u8; 9];
        self.var_int_len = 0;
    }

    fn push_var_int(&mut self, byte: u8) -> Option<u64> {
        self.var_int[self.var_int_len] = byte;
        self.var_int_len += 1;
        compact_int_complete(&self.var_int[..self.var_int_len])
    }

    fn step(&mut self, byte: u8) {
        match self.state {
            RawState::Version => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = RawState::InputCount;
                    self.reset_var_int();
                }
            }
            RawState::InputCount => {
                if let Some(count) = self.push_var_int(byte) {
                    self.inputs_len = count;
                    self.seen = 0;
                    self.reset_var_int();
                    if count == 0 {
                        self.state = RawState::OutputCount;
                    } else {
                        self.state = RawState::Inputs;
                        // the next input starts with its 36-byte outpoint
                        self.remaining = 36;
                    }
                }
            }
            RawState::Inputs => {
                if self.remaining > 0 {
                    self.remaining -= 1;
                    if self.remaining == 0 && self.seen == self.inputs_len {
                        self.state = RawState::OutputCount;
                        self.reset_var_int();
                    }
                } else if let Some(script_len) = self.push_var_int(byte) {
                    self.seen += 1;
                    self.reset_var_int();
                    if self.seen < self.inputs_len {
                        // script, sequence, and the next input's outpoint
                        self.remaining = script_len.saturating_add(4 + 36);
                    } else {
                        self.remaining = script_len.saturating_add(4);
                    }
                }
            }
            RawState::OutputCount => {
                if let Some(count) = self.push_var_int(byte) {
                    self.outputs_len = count;
                    self.seen = 0;
                    self.reset_var_int();
                    if count == 0 {
                        self.state = RawState::Locktime;
                        self.remaining = 4;
                    } else {
                        self.state = RawState::OutputsValue;
                        self.remaining = 8;
                        self.value = 0;
                    }
                }
            }
            RawState::OutputsValue => {
                if self.remaining > 8 {
                    // still inside the previous output's script
                    self.remaining -= 1;
                } else {
                    let shift = 8 * (8 - self.remaining as u32);
                    self.value |= (byte as u64) << shift;
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        if self.seen == self.prev_index {
                            self.referenced_value = self.value;
                        }
                        self.state = RawState::Outputs;
                        self.reset_var_int();
                    }
                }
            }
            RawState::Outputs => {
                if self.remaining > 0 {
                    self.remaining -= 1;
                    if self.remaining == 0 && self.seen == self.outputs_len {
                        self.state = RawState::Locktime;
                        self.remaining = 4;
                    }
                } else if let Some(script_len) = self.push_var_int(byte) {
                    self.seen += 1;
                    self.reset_var_int();
                    if self.seen < self.outputs_len {
                        self.value = 0;
                        self.state = RawState::OutputsValue;
                        self.remaining = script_len.saturating_add(8);
                    } else if script_len == 0 {
                        self.state = RawState::Locktime;
                        self.remaining = 4;
                    } else {
                        self.remaining = script_len;
                    }
                }
            }
            RawState::Locktime => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.state = RawState::Done;
                }
            }
            RawState::Done => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::TxStream;
    use crate::types::{Outpoint, ScriptPubkey, ScriptSig, TxOut};
    use streamsign_core::ser::ByteFormat;

    fn sample_tx(script_len: usize) -> (Vec<u8>, TXID) {
        let mut stream = TxStream::new(vec![], 2, 2, 3, 777);
        let outpoint = Outpoint::deserialize_hex(
            "fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edbd4a38002205ab9fa703000000",
        )
        .unwrap();
        stream
            .write_input(&outpoint, &ScriptSig::new(vec![0xaa; script_len]), 0xffff_fffe)
            .unwrap();
        stream
            .write_input(&outpoint, &ScriptSig::null(), 0xffff_ffff)
            .unwrap();
        stream
            .write_output(&TxOut::new(11_000u64, ScriptPubkey::new(vec![0x51])))
            .unwrap();
        stream
            .write_output(&TxOut::new(55_000u64, ScriptPubkey::new(vec![0xbb; script_len])))
            .unwrap();
        stream
            .write_output(&TxOut::new(99_000u64, ScriptPubkey::null()))
            .unwrap();
        let bytes = stream.take_fragment();

        let mut hasher = Hash256Writer::default();
        hasher.write_all(&bytes).unwrap();
        (bytes, hasher.finish_marked())
    }

    fn run(parser: &mut RawTxParser, bytes: &[u8], chunk: usize) -> (TXID, u64) {
        for piece in bytes.chunks(chunk) {
            if let RawEvent::Complete {
                txid,
                referenced_value,
            } = parser.feed(piece).unwrap()
            {
                return (txid, referenced_value);
            }
        }
        panic!("stream ended before locktime");
    }

    #[test]
    fn it_parses_single_and_byte_wise_chunks() {
        for script_len in [0usize, 1, 0x20, 0xfd, 0x1234] {
            let (bytes, txid) = sample_tx(script_len);
            for chunk in [bytes.len(), 1, 7] {
                let mut parser = RawTxParser::new(1);
                let (computed, value) = run(&mut parser, &bytes, chunk);
                assert_eq!(computed, txid);
                assert_eq!(value, 55_000);
            }
        }
    }

    #[test]
    fn it_extracts_each_output_value() {
        let (bytes, _) = sample_tx(4);
        for (idx, expected) in [(0u32, 11_000u64), (1, 55_000), (2, 99_000), (9, 0)] {
            let mut parser = RawTxParser::new(idx);
            let (_, value) = run(&mut parser, &bytes, 1);
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn it_ignores_trailing_bytes() {
        let (mut bytes, txid) = sample_tx(2);
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let mut parser = RawTxParser::new(0);
        let (computed, _) = run(&mut parser, &bytes, bytes.len());
        assert_eq!(computed, txid);
    }

    #[test]
    fn it_reports_need_more_mid_stream() {
        let (bytes, _) = sample_tx(2);
        let mut parser = RawTxParser::new(0);
        match parser.feed(&bytes[..10]).unwrap() {
            RawEvent::NeedMore => {}
            _ => panic!("completed too early"),
        }
    }
}
