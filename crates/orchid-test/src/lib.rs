//! Orchid Test Harness - scenarios, fuzzing and benchmarks
//!
//! This crate provides:
//! - Scenario models (counters, bomb, dual clocks, reorder buffer)
//! - A LIFO implementation and sampler for co-simulated checking
//! - State-hash fuzzing and transaction properties

pub mod scenarios;
pub mod state_fuzzer;

pub use scenarios::*;
pub use state_fuzzer::*;
