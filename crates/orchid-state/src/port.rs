//! Ports - append-only queues bound to the verification harness
//!
//! The harness pushes values outside any transaction. Rules consume them
//! through a read index that lives in an ordinary cell, so consumption is
//! transactional and reverts with the invocation that performed it. Queue
//! contents are not part of the model state hash.

use orchid_core::{CellId, CellValue, LeafKind, NodeId, OrchidError, OrchidResult, PortId, Value};

use crate::StateTree;

/// Which side of the harness fills the queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Inputs the reference model consumes
    Stimulus,
    /// Implementation outputs the reference model must reproduce
    Observed,
}

/// Queue storage for one port
#[derive(Clone, Debug)]
pub struct PortQueue {
    pub(crate) owner: NodeId,
    pub(crate) path: String,
    pub(crate) direction: PortDirection,
    pub(crate) element: LeafKind,
    pub(crate) entries: Vec<Value>,
    pub(crate) read_index: CellId,
}

impl PortQueue {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn element(&self) -> &LeafKind {
        &self.element
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cell holding the number of consumed entries
    pub fn read_index(&self) -> CellId {
        self.read_index
    }
}

impl StateTree {
    pub fn port(&self, port: PortId) -> &PortQueue {
        &self.ports[port.index()]
    }

    pub fn ports(&self) -> impl Iterator<Item = (PortId, &PortQueue)> {
        self.ports.iter().enumerate().map(|(i, p)| (PortId::new(i), p))
    }

    /// Entries consumed by committed transactions
    pub fn consumed(&self, port: PortId) -> usize {
        match self.peek(self.ports[port.index()].read_index) {
            CellValue::Defined(Value::Int(n)) => *n as usize,
            _ => 0,
        }
    }

    pub fn remaining(&self, port: PortId) -> usize {
        self.ports[port.index()].entries.len().saturating_sub(self.consumed(port))
    }

    /// Append a value from the harness side
    pub fn push(&mut self, port: PortId, value: Value) -> OrchidResult<()> {
        let queue = &mut self.ports[port.index()];
        let shown = value.to_string();
        let value = queue
            .element
            .check_and_cast(value)
            .map_err(|reason| OrchidError::CastRejected {
                cell: queue.path.clone(),
                value: shown,
                reason,
            })?;
        queue.entries.push(value);
        Ok(())
    }

    /// No more data will arrive: empty queues now guard instead of asking for more
    pub fn close_ports(&mut self) {
        self.ports_open = false;
    }

    pub fn reopen_ports(&mut self) {
        self.ports_open = true;
    }

    pub fn ports_open(&self) -> bool {
        self.ports_open
    }

    fn remaining_in(&self, direction: PortDirection) -> usize {
        self.ports()
            .filter(|(_, p)| p.direction == direction)
            .map(|(id, _)| self.remaining(id))
            .sum()
    }

    /// Observed outputs not yet reproduced by the reference model
    pub fn unmatched_outputs(&self) -> usize {
        self.remaining_in(PortDirection::Observed)
    }

    /// Stimulus not yet consumed by the reference model
    pub fn pending_stimulus(&self) -> usize {
        self.remaining_in(PortDirection::Stimulus)
    }
}
