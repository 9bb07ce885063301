//! Orchid Verify - scoreboard checking of implementations against reference models
//!
//! This crate provides:
//! - `PortFeed` and the `CoSimulation` trait for external data sources
//! - Scripted traces and clocked co-simulation of an implementation model
//! - `CheckSearch`, a backtracking search for a reference-model interleaving
//!   that reproduces every observed output

pub mod cosim;
pub mod search;

pub use cosim::*;
pub use search::*;
