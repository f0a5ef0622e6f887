//! # bitmark-tests
//!
//! Integration tests for the Bitmark mining engine:
//! - Template assembly scenarios (ordering, fees, size limits)
//! - Extra-nonce sequencing and stale submission handling
//! - Proof-of-work round trips, including Equihash determinism

pub mod harness;

#[cfg(test)]
mod mining_tests;

#[cfg(test)]
mod pow_tests;

pub use harness::*;
