//! Orchid Runtime - rules, models and simulators
//!
//! This crate turns a state tree into an executable model:
//! - Handlers and rule-set construction over finite parameter domains
//! - `Model`: tree, rules and clocks behind one transaction gateway
//! - Atomic-rule simulator with exhaustive probe and deadlock detection
//! - Clocked simulator with same-edge isolation
//! - `tracing` subscriber setup

pub mod rule;
pub mod model;
pub mod atomic;
pub mod clocked;
pub mod logging;

pub use rule::*;
pub use model::*;
pub use atomic::*;
pub use clocked::*;
