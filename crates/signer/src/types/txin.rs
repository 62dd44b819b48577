//! Bitcoin Outpoint type.

use std::io::{Read, Write};

use streamsign_core::ser::{ByteFormat, SerError, SerResult};

use crate::hashes::TXID;

/// An Outpoint. This is a unique identifier for a UTXO, and is composed of
/// a transaction ID (in Bitcoin-style LE format), and the index of the
/// output being spent within that transaction's output vector.
///
/// `Outpoint::null()` and `Outpoint::default()` return the null Outpoint,
/// which references a txid of all 0, and an index of 0xffff_ffff. This null
/// outpoint is used in every coinbase transaction.
#[derive(serde::Serialize, serde::Deserialize, Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Outpoint {
    /// The txid that created the UTXO being pointed to.
    pub txid: TXID,
    /// The index of that UTXO in the transaction's output vector.
    pub idx: u32,
}

impl Outpoint {
    /// Returns a new Outpoint from a digest and index
    pub fn new(txid: TXID, idx: u32) -> Self {
        Self { txid, idx }
    }

    /// Returns the `default`, or `null` Outpoint. This is used in the
    /// coinbase input.
    pub fn null() -> Self {
        Outpoint {
            txid: TXID::default(),
            idx: 0xffff_ffff,
        }
    }
}

impl Default for Outpoint {
    fn default() -> Self {
        Outpoint::null()
    }
}

impl ByteFormat for Outpoint {
    type Error = SerError;

    fn serialized_length(&self) -> usize {
        36
    }

    fn read_from<T>(reader: &mut T, _limit: usize) -> SerResult<Self>
    where
        T: Read,
        Self: std::marker::Sized,
    {
        Ok(Outpoint {
            txid: TXID::read_from(reader, 0)?,
            idx: Self::read_u32_le(reader)?,
        })
    }

    fn write_to<T>(&self, writer: &mut T) -> SerResult<usize>
    where
        T: Write,
    {
        let mut len = self.txid.write_to(writer)?;
        len += Self::write_u32_le(writer, self.idx)?;
        Ok(len)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static NULL_OUTPOINT: &str =
        "0000000000000000000000000000000000000000000000000000000000000000ffffffff";

    #[test]
    fn it_serializes_and_deserializes_outpoints() {
        let cases = [
            (
                Outpoint {
                    txid: TXID::default(),
                    idx: 0,
                },
                (0..36).map(|_| "00").collect::<String>(),
            ),
            (Outpoint::null(), NULL_OUTPOINT.to_string()),
        ];
        for case in cases.iter() {
            assert_eq!(case.0.serialized_length(), case.1.len() / 2);
            assert_eq!(case.0.serialize_hex(), case.1);
            assert_eq!(Outpoint::deserialize_hex(&case.1).unwrap(), case.0);
        }
    }
}
