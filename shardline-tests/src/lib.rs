//! Shardline Tests - deterministic simulation and integration tests.
//!
//! Every test here runs against `SimulatedItemStore` and
//! `InMemoryCacheBackend`, so fault sequences are reproducible from a seed.
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): seeded workloads with fault injection
//! - `ledger_dst`: random balance workloads checked against a model
//! - `retry_dst`: batch reconciliation under forced and random residue
//!
//! **Integration Tests** (`*_tests.rs`): multi-component behavior
//! - `routing_tests`: registry, directory and allocation together
//! - `ledger_tests`: the ledger over real routing and caching
//! - `config_tests`: configuration files and overrides
//!
//! **Support Modules**:
//! - `harness`: wires a full stack over simulated backends
//! - `properties`: invariant checkers
//! - `scenarios`: seeds and standard shard layouts
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Integration tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod harness;
pub mod properties;
pub mod scenarios;

// DST test modules (deterministic simulation with fault injection).
#[cfg(test)]
mod ledger_dst;
#[cfg(test)]
mod retry_dst;

// Integration test modules (multi-component tests).
#[cfg(test)]
mod config_tests;
