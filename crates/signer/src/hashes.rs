//! Marked digest types used by the signing engine.

use streamsign_core::mark_hash256;

mark_hash256!(
    /// A marked digest representing a transaction ID, in internal
    /// (little-endian) byte order. Use `reversed()` for the byte order
    /// block explorers display.
    TXID
);
