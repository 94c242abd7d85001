//! Tierset Tests - scenario tests for the tiered store.
//!
//! Tests run the store over two `SimulatedTier`s with deterministic fault
//! injection and check what each tier holds afterwards.
//!
//! ## Test Organization
//!
//! - `tiered_store_tests`: upload, download and purge scenarios, forced
//!   faults at every step, multi-seed runs with probabilistic faults
//!
//! **Support Modules**:
//! - `properties`: checks of what each tier holds after an operation
//!
//! ## Naming Conventions
//!
//! - Scenario tests: `test_<operation>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
