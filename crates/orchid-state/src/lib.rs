//! Orchid State - the model state and its only mutation gateway
//!
//! A model's state is a frozen tree of typed cells:
//! - Nodes own named cells, ports and child nodes
//! - Union slots keep every option elaborated and select one as live
//! - Ports are append-only queues filled by the verification harness
//!
//! Cell values change only through [`Invocation::execute`], which records
//! every write so it can be reverted and re-applied, and keeps the model
//! state hash current.

pub mod tree;
pub mod builder;
pub mod port;
pub mod txn;

pub use tree::*;
pub use builder::*;
pub use port::*;
pub use txn::*;
