//! Identity types for Orchid models
//!
//! Every entity of a frozen model lives in an arena and is addressed by a
//! 32-bit index. Identifiers are only meaningful for the model that issued them.

use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn new(index: usize) -> Self {
                $name(index as u32)
            }

            /// Position in the owning arena
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "#{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Node identity - a hierarchical container in the state tree
    NodeId,
    "Node"
);

arena_id!(
    /// Cell identity - an atomic unit of mutable typed state
    CellId,
    "Cell"
);

arena_id!(
    /// Handler identity - a rule body with its parameter declarations
    HandlerId,
    "Handler"
);

arena_id!(
    /// Rule identity - one concrete parameterization of a handler
    RuleId,
    "Rule"
);

arena_id!(
    /// Clock identity - assigned in declaration order
    ClockId,
    "Clock"
);

arena_id!(
    /// Port identity - an append-only queue bound to the verification harness
    PortId,
    "Port"
);

impl NodeId {
    /// The root node of every tree
    pub const ROOT: NodeId = NodeId(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_roundtrip_index() {
        let id = CellId::new(42);
        assert_eq!(id.index(), 42);
        assert_eq!(format!("{:?}", id), "Cell(42)");
        assert_eq!(format!("{}", id), "Cell#42");
    }

    #[test]
    fn test_ids_order_by_index() {
        assert!(ClockId::new(1) < ClockId::new(2));
        assert_eq!(NodeId::ROOT, NodeId::new(0));
    }
}
