//! Orchid Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the Orchid kernel:
//! - Identifiers (NodeId, CellId, RuleId, HandlerId, ClockId, PortId)
//! - Leaf values and cell contents
//! - Leaf kinds: the cast/validate/hash/enumerate contract for cells
//! - Model-state-hash helpers
//! - The workspace error type

pub mod id;
pub mod value;
pub mod kind;
pub mod hash;
pub mod error;

pub use id::*;
pub use value::*;
pub use kind::*;
pub use hash::*;
pub use error::*;
