//! Mechanic probe: library crate for the OBD-II sampling runtime.
//!
//! Re-exports all modules so external crates (e.g. `mechanic-e2e-tests`)
//! can drive the sampler against a mock transport.

pub mod config;
pub mod error;
pub mod sampler;
