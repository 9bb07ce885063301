//! Orchid Time - virtual clocks
//!
//! This crate implements clocked scheduling:
//! - Clocks with period, phase and next edge time in picoseconds
//! - Nested clocks whose rules fire on the parent's edges
//! - Earliest-edge selection with declaration-order tie-break

pub mod clock;
pub mod schedule;

pub use clock::*;
pub use schedule::*;
