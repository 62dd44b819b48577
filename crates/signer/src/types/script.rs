//! Simple types for Bitcoin Script datastructures, each of which is treated
//! as an opaque, wrapped byte vector.
//!
//! We do not handle assembly, disassembly, or Script execution here. The
//! engine manipulates scripts only through the builders in
//! [`crate::scripts`] and [`crate::multisig`], and hashes or serializes
//! them unchanged everywhere else.
//!
//! Scripts can be freely converted between each other using `From` and
//! `Into`. This merely rewraps the underlying byte vector in the new type.

use streamsign_core::{impl_script_conversion, wrap_prefixed_byte_vector};

wrap_prefixed_byte_vector!(
    /// A Script is a wrapped byte vector for use as an opaque script, e.g.
    /// the previous-output script a signature commits to.
    ///
    /// `Script::null()` and `Script::default()` return the empty byte
    /// vector, which represents numerical 0, boolean `false`, or the null
    /// bytestring.
    Script
);
wrap_prefixed_byte_vector!(
    /// A ScriptSig is a wrapped byte vector for use in an input's
    /// signature script.
    ScriptSig
);
wrap_prefixed_byte_vector!(
    /// A ScriptPubkey is a wrapped byte vector locking a transaction
    /// output.
    ScriptPubkey
);

impl_script_conversion!(Script, ScriptPubkey);
impl_script_conversion!(Script, ScriptSig);
impl_script_conversion!(ScriptPubkey, ScriptSig);
