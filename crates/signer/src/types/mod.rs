//! Transaction primitive types consumed by the signing engine.

/// Script types: opaque, prefixed byte vectors.
pub mod script;

/// Outpoints.
pub mod txin;

/// Compiled transaction outputs.
pub mod txout;

pub use script::*;
pub use txin::*;
pub use txout::*;
