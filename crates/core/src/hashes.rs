//! Utilities for working with Bitcoin-style double-SHA-256 digests, and for
//! disambiguating digests via marker newtypes.
//!
//! We wrap hashes in marked newtypes in order to prevent type-confusion
//! between TXIDs, sighashes, and other digests with the same length.

use digest::Digest;
use sha2::Sha256;
use std::io::{Result as IOResult, Write};

use crate::ser::ByteFormat;

/// A raw 32-byte digest in internal (little-endian) byte order.
pub type Hash256Digest = [u8; 32];

/// A marked digest newtype. Transparently wraps a `Hash256Digest` while
/// keeping TXIDs, sighashes, and commit hashes distinct at the type level.
pub trait MarkedDigest:
    Default + Copy + Clone + Eq + PartialEq + std::fmt::Debug + ByteFormat
{
    /// Wrap a raw digest.
    fn new(hash: Hash256Digest) -> Self;

    /// Return the wrapped digest.
    fn internal(&self) -> Hash256Digest;

    /// Return the digest as a byte vector.
    fn bytes(&self) -> Vec<u8> {
        self.internal().to_vec()
    }

    /// Return a copy with the byte order flipped. Block explorers display
    /// TXIDs big-endian; the wire carries them little-endian.
    fn reversed(&self) -> Self {
        let mut digest = self.internal();
        digest.reverse();
        Self::new(digest)
    }
}

/// A `Write` sink that can finalize into a digest.
pub trait MarkedDigestWriter<D>: Default + Write {
    /// Consume the writer, produce the digest.
    fn finish(self) -> D;
}

/// A struct that exposes a Bitcoin-style Hash256 `Write` interface by
/// wrapping an internal SHA-256 instance. `finish()` applies the second
/// SHA-256 pass.
///
/// ```
/// use std::io::Write;
/// use streamsign_core::hashes::{Hash256Writer, MarkedDigestWriter};
///
/// # fn main() -> std::io::Result<()> {
/// let mut w = Hash256Writer::default();
/// # let data = [0u8; 32];
///
/// // Writing more than once will update the hasher.
/// w.write_all(&data)?;
///
/// // Call finish to consume the hasher and produce the digest.
/// let digest = w.finish();
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Hash256Writer {
    internal: Sha256,
}

impl Write for Hash256Writer {
    fn write(&mut self, buf: &[u8]) -> IOResult<usize> {
        self.internal.update(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> IOResult<()> {
        Ok(())
    }
}

impl MarkedDigestWriter<Hash256Digest> for Hash256Writer {
    fn finish(self) -> Hash256Digest {
        let first = self.internal.finalize();
        Sha256::digest(first).into()
    }
}

impl Hash256Writer {
    /// Consume the writer, produce a marked digest.
    pub fn finish_marked<M: MarkedDigest>(self) -> M {
        M::new(self.finish())
    }
}

/// Branch-free equality over two 32-byte digests. Every prevhash and
/// commit-hash comparison in the signing engine goes through this.
pub fn ct_eq_32(a: &Hash256Digest, b: &Hash256Digest) -> bool {
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}
