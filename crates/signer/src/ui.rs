//! The seam to the confirmation display.
//!
//! The engine asks the user exactly twice per session (three times when the
//! fee is above the coin's ceiling): once for the fee if it is excessive,
//! and once for the total being spent. A `false` from either aborts the
//! session with an action-cancelled failure.

/// The display/confirmation contract consumed by the engine.
pub trait ConfirmationUi {
    /// Ask the user to approve a fee above the coin's per-kB ceiling.
    fn confirm_fee(&mut self, fee: &str) -> bool;

    /// Final gate: ask the user to approve spending `total` with `fee`.
    fn confirm_transaction(&mut self, total: &str, fee: &str) -> bool;

    /// Signing is underway; show progress.
    fn show_signing(&mut self);

    /// Return the display to the home screen.
    fn go_home(&mut self);
}
