//! # Streamsign Core
//!
//! `streamsign-core` contains the byte-format and hashing utilities shared
//! by the `streamsign` signing engine.
//!
//! ## Crate Layout
//!
//! ### Ser
//!
//! The `ByteFormat` trait is a simple serialization API using
//! `std::io::{Read, Write}`. Implementers define the binary serialization
//! format of the type. It carries convenience methods for the little-endian
//! integers and Bitcoin-style VarInts that consensus serialization is made
//! of, including a streaming VarInt decoder for byte-at-a-time parsers.
//!
//! ### Hashes
//!
//! The hashes module provides `Hash256Writer`, a `std::io::Write` sink over
//! a SHA-256 context that produces Bitcoin's double-SHA-256 on `finish()`,
//! and the `MarkedDigest` machinery for newtyping 32-byte digests so TXIDs
//! and sighashes cannot be confused for one another.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

#[macro_use]
pub mod macros;

pub mod hashes;
pub mod ser;
