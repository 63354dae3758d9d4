//! Primordia Protocol — core primitives of an inter-agent settlement protocol.
//!
//! A pure, I/O-free library: a deterministic canonical serializer, the
//! cryptographic primitives bound to it, seven signed record types, a
//! netting engine, a default/bankruptcy resolution algorithm, and a
//! streaming credit-rating aggregator. Every operation here is
//! referentially transparent — no threads, no network, no global
//! mutable state beyond what a caller exclusively owns (an
//! [`acr::AcrComputer`]).
//!
//! Transport, persistence, key custody, and process hosting are
//! deliberately out of scope; this crate defines only the wire-level
//! contracts those layers consume.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod acr;
pub mod amr;
pub mod canonical;
pub mod crypto;
pub mod dbp;
pub mod error;
pub mod fc;
pub mod mbs;
pub mod meter;
pub mod msr;
pub mod netting;
pub mod pricing;

pub use error::{Error, Result};
pub use msr::VerifyOutcome;
