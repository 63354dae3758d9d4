//! Error taxonomy shared by every record type in the protocol.
//!
//! Producers and verifiers never panic on malformed input; every fallible
//! path returns a [`Result`] with a specific [`Error`] variant so the
//! first-failure reason is stable enough to log.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol-level errors, grouped by the taxonomy in spec §7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Missing field, wrong type, or unknown record version.
    #[error("schema error: {0}")]
    Schema(String),

    /// A record-specific invariant does not hold (payer == payee, units <= 0,
    /// malformed window, recomputed derived field mismatch, ...).
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Signature bytes were malformed, or cryptographically invalid.
    #[error("signature error: {0}")]
    Signature(String),

    /// A value outside the canonical domain was handed to the codec (a
    /// float, or an integer outside the 53-bit-safe range).
    #[error("canonical codec error: {0}")]
    Canonical(String),

    /// An operation required at least one element but received none.
    #[error("input error: {0}")]
    Input(String),
}

impl Error {
    /// True for [`Error::Schema`].
    pub fn is_schema(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// True for [`Error::Invariant`].
    pub fn is_invariant(&self) -> bool {
        matches!(self, Error::Invariant(_))
    }

    /// True for [`Error::Signature`].
    pub fn is_signature(&self) -> bool {
        matches!(self, Error::Signature(_))
    }
}
