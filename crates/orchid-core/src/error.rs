//! Error types for the Orchid kernel

use thiserror::Error;

use crate::CastRejection;

/// Core Orchid errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchidError {
    // Control signals
    #[error("Guard failed")]
    GuardFailed,

    #[error("Need more stimulus on port {port}")]
    NeedMoreStimulus { port: String },

    // Cell access errors
    #[error("Read of undefined cell {cell}")]
    ReadOfUndefined { cell: String },

    #[error("Access to unselected cell {cell}")]
    ReadOfUnselected { cell: String },

    #[error("Cell {cell} rejected {value}: {reason}")]
    CastRejected {
        cell: String,
        value: String,
        #[source]
        reason: CastRejection,
    },

    // Engine errors
    #[error("State consistency violation on {cell}: expected {expected}, found {found}")]
    StateConsistency {
        cell: String,
        expected: String,
        found: String,
    },

    // Build errors
    #[error("Unknown name: {0}")]
    UnknownName(String),

    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    #[error("Parameter {param} of {handler} has no finite domain")]
    UnboundedDomain { handler: String, param: String },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Clock errors
    #[error("Clock nesting cycle through {0}")]
    ClockCycle(String),

    #[error("Clock {0} has no period")]
    ClockNotScheduled(String),

    // Rule defects
    #[error("Rule failed: {0}")]
    RuleFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl OrchidError {
    /// Guard failures are "not applicable now" and never escape an invocation
    #[inline]
    pub fn is_guard(&self) -> bool {
        matches!(self, OrchidError::GuardFailed)
    }

    #[inline]
    pub fn is_need_more_stimulus(&self) -> bool {
        matches!(self, OrchidError::NeedMoreStimulus { .. })
    }

    /// Engine-internal corruption, always propagated
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, OrchidError::StateConsistency { .. })
    }
}

/// Result type for Orchid operations
pub type OrchidResult<T> = Result<T, OrchidError>;
