//! Frozen state tree
//!
//! Nodes, cells and ports live in arenas indexed by their ids. The topology
//! is fixed once the tree is frozen; only cell values change afterwards, and
//! only through [`Invocation`](crate::Invocation).

use std::fmt::Write as _;

use orchid_core::{
    CellId, CellValue, LeafKind, NameHash, NodeId, OrchidError, OrchidResult, PortId, Value,
};

use crate::PortQueue;

/// A named entry of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Child {
    Node(NodeId),
    Cell(CellId),
    Port(PortId),
}

/// One (union, option) requirement on the path from the root to a cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selector {
    pub discriminant: CellId,
    pub option: i64,
}

/// Union slot: every option stays elaborated, the discriminant picks the live one
#[derive(Clone, Debug)]
pub struct UnionSlot {
    pub options: Vec<NodeId>,
    pub discriminant: CellId,
}

#[derive(Clone, Debug)]
pub(crate) struct NodeSlot {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<(String, Child)>,
    pub(crate) union: Option<UnionSlot>,
    pub(crate) selectors: Vec<Selector>,
}

#[derive(Clone, Debug)]
pub(crate) struct CellSlot {
    pub(crate) owner: NodeId,
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) kind: LeafKind,
    pub(crate) value: CellValue,
    pub(crate) name_hash: NameHash,
    pub(crate) contribution: u64,
    pub(crate) selectors: Vec<Selector>,
}

impl CellSlot {
    pub(crate) fn contribution_of(&self, value: &CellValue) -> u64 {
        self.name_hash.contribution(self.kind.hash_value(value))
    }
}

/// The whole model state
#[derive(Clone, Debug)]
pub struct StateTree {
    pub(crate) nodes: Vec<NodeSlot>,
    pub(crate) cells: Vec<CellSlot>,
    pub(crate) ports: Vec<PortQueue>,
    pub(crate) hash: u64,
    pub(crate) ports_open: bool,
}

impl StateTree {
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Incrementally maintained model state hash
    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.hash
    }

    /// Model state hash computed from scratch
    pub fn recompute_hash(&self) -> u64 {
        self.cells
            .iter()
            .fold(0, |acc, cell| acc ^ cell.contribution_of(&cell.value))
    }

    pub fn node_path(&self, node: NodeId) -> &str {
        &self.nodes[node.index()].path
    }

    pub fn node_name(&self, node: NodeId) -> &str {
        &self.nodes[node.index()].name
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.index()].parent
    }

    pub fn children(&self, node: NodeId) -> impl Iterator<Item = (&str, Child)> {
        self.nodes[node.index()]
            .children
            .iter()
            .map(|(name, child)| (name.as_str(), *child))
    }

    pub fn cell_path(&self, cell: CellId) -> &str {
        &self.cells[cell.index()].path
    }

    pub fn cell_name(&self, cell: CellId) -> &str {
        &self.cells[cell.index()].name
    }

    pub fn cell_owner(&self, cell: CellId) -> NodeId {
        self.cells[cell.index()].owner
    }

    pub fn kind(&self, cell: CellId) -> &LeafKind {
        &self.cells[cell.index()].kind
    }

    /// Raw cell content, ignoring liveness
    pub fn peek(&self, cell: CellId) -> &CellValue {
        &self.cells[cell.index()].value
    }

    /// A cell is live when every union on its path selects the option containing it
    pub fn is_live(&self, cell: CellId) -> bool {
        self.selectors_hold(&self.cells[cell.index()].selectors)
    }

    pub fn is_node_live(&self, node: NodeId) -> bool {
        self.selectors_hold(&self.nodes[node.index()].selectors)
    }

    fn selectors_hold(&self, selectors: &[Selector]) -> bool {
        selectors.iter().all(|s| {
            self.cells[s.discriminant.index()].value == CellValue::Defined(Value::Int(s.option))
        })
    }

    /// Read a live, defined cell
    pub fn read(&self, cell: CellId) -> OrchidResult<&Value> {
        let slot = &self.cells[cell.index()];
        if !self.selectors_hold(&slot.selectors) {
            return Err(OrchidError::ReadOfUnselected { cell: slot.path.clone() });
        }
        match &slot.value {
            CellValue::Defined(v) => Ok(v),
            CellValue::Undefined => Err(OrchidError::ReadOfUndefined { cell: slot.path.clone() }),
        }
    }

    pub fn union_slot(&self, node: NodeId) -> OrchidResult<&UnionSlot> {
        self.nodes[node.index()]
            .union
            .as_ref()
            .ok_or_else(|| OrchidError::InvalidParameter(format!("{} is not a union", self.node_path(node))))
    }

    /// Index of the live option of a union node
    pub fn selected_option(&self, node: NodeId) -> OrchidResult<usize> {
        let slot = self.union_slot(node)?;
        let value = self.read(slot.discriminant)?;
        value
            .as_int()
            .map(|i| i as usize)
            .ok_or_else(|| OrchidError::InvalidParameter(format!("{} has a non-integer discriminant", self.node_path(node))))
    }

    /// Resolve a dotted name relative to `node`
    pub fn resolve(&self, node: NodeId, name: &str) -> OrchidResult<Child> {
        let mut current = Child::Node(node);
        for segment in name.split('.') {
            let Child::Node(n) = current else {
                return Err(self.unknown(node, name));
            };
            current = self.nodes[n.index()]
                .children
                .iter()
                .find(|(child, _)| child == segment)
                .map(|(_, c)| *c)
                .ok_or_else(|| self.unknown(node, name))?;
        }
        Ok(current)
    }

    fn unknown(&self, node: NodeId, name: &str) -> OrchidError {
        OrchidError::UnknownName(format!("{}.{}", self.node_path(node), name))
    }

    /// Resolve an absolute dotted path starting at the root's name
    pub fn lookup(&self, path: &str) -> OrchidResult<Child> {
        let root = &self.nodes[NodeId::ROOT.index()];
        match path.split_once('.') {
            None if path == root.name => Ok(Child::Node(NodeId::ROOT)),
            Some((head, rest)) if head == root.name => self.resolve(NodeId::ROOT, rest),
            _ => Err(OrchidError::UnknownName(path.to_string())),
        }
    }

    pub fn lookup_cell(&self, path: &str) -> OrchidResult<CellId> {
        match self.lookup(path)? {
            Child::Cell(cell) => Ok(cell),
            _ => Err(OrchidError::UnknownName(format!("{} is not a cell", path))),
        }
    }

    pub fn lookup_node(&self, path: &str) -> OrchidResult<NodeId> {
        match self.lookup(path)? {
            Child::Node(node) => Ok(node),
            _ => Err(OrchidError::UnknownName(format!("{} is not a node", path))),
        }
    }

    pub fn lookup_port(&self, path: &str) -> OrchidResult<PortId> {
        match self.lookup(path)? {
            Child::Port(port) => Ok(port),
            _ => Err(OrchidError::UnknownName(format!("{} is not a port", path))),
        }
    }

    /// Is `node` equal to or below `ancestor`
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes[n.index()].parent;
        }
        false
    }

    /// Every cell's path and content, in declaration order
    pub fn snapshot(&self) -> Vec<(String, CellValue)> {
        self.cells
            .iter()
            .map(|cell| (cell.path.clone(), cell.value.clone()))
            .collect()
    }

    /// Cell contents only, in declaration order
    pub fn values(&self) -> Vec<CellValue> {
        self.cells.iter().map(|cell| cell.value.clone()).collect()
    }

    /// Hierarchical dump, one line per cell
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_node(NodeId::ROOT, 0, &mut out);
        out
    }

    fn render_node(&self, node: NodeId, depth: usize, out: &mut String) {
        let slot = &self.nodes[node.index()];
        let marker = if self.is_node_live(node) { "" } else { " (unselected)" };
        let _ = writeln!(out, "{:indent$}{}{}", "", slot.name, marker, indent = depth * 2);
        if let Some(union) = &slot.union {
            let cell = &self.cells[union.discriminant.index()];
            let _ = writeln!(out, "{:indent$}#selected = {}", "", cell.value, indent = depth * 2 + 2);
        }
        for (name, child) in &slot.children {
            match *child {
                Child::Node(n) if self.nodes[n.index()].parent == Some(node) => {
                    self.render_node(n, depth + 1, out)
                }
                Child::Cell(c) if self.cells[c.index()].owner == node => {
                    let cell = &self.cells[c.index()];
                    let _ = writeln!(
                        out,
                        "{:indent$}{}: {} = {}",
                        "",
                        name,
                        cell.kind,
                        cell.kind.render_cell(&cell.value),
                        indent = depth * 2 + 2
                    );
                }
                Child::Port(p) if self.ports[p.index()].owner == node => {
                    let port = &self.ports[p.index()];
                    let _ = writeln!(
                        out,
                        "{:indent$}{}: {:?} port, {} of {} consumed",
                        "",
                        name,
                        port.direction,
                        self.consumed(p),
                        port.entries.len(),
                        indent = depth * 2 + 2
                    );
                }
                _ => {}
            }
        }
    }

    /// Overwrite a cell outside any transaction, keeping the hash current
    pub(crate) fn set_raw(&mut self, cell: CellId, value: CellValue) {
        let slot = &mut self.cells[cell.index()];
        let contribution = slot.contribution_of(&value);
        self.hash ^= slot.contribution ^ contribution;
        slot.contribution = contribution;
        slot.value = value;
    }

    /// Swap `expected` for `value`, failing if the live content differs
    pub(crate) fn replace_checked(
        &mut self,
        cell: CellId,
        expected: &CellValue,
        value: CellValue,
    ) -> OrchidResult<()> {
        let slot = &self.cells[cell.index()];
        if slot.value != *expected {
            return Err(OrchidError::StateConsistency {
                cell: slot.path.clone(),
                expected: slot.kind.render_cell(expected),
                found: slot.kind.render_cell(&slot.value),
            });
        }
        self.set_raw(cell, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeBuilder;

    fn sample() -> (StateTree, CellId, CellId) {
        let mut b = TreeBuilder::new("top");
        let root = b.root();
        let sub = b.add_node(root, "sub").unwrap();
        let x = b.add_cell(root, "x", LeafKind::bounded(10), Some(Value::Int(3))).unwrap();
        let y = b.add_cell(sub, "y", LeafKind::Boolean, None).unwrap();
        (b.freeze(), x, y)
    }

    #[test]
    fn test_lookup_paths() {
        let (tree, x, y) = sample();
        assert_eq!(tree.lookup_cell("top.x").unwrap(), x);
        assert_eq!(tree.lookup_cell("top.sub.y").unwrap(), y);
        assert_eq!(tree.cell_path(y), "top.sub.y");
        assert!(matches!(tree.lookup_cell("top.z"), Err(OrchidError::UnknownName(_))));
        assert!(tree.lookup_cell("top.sub").is_err());
        assert!(tree.lookup_cell("other.x").is_err());
        assert_eq!(tree.lookup_node("top").unwrap(), NodeId::ROOT);
    }

    #[test]
    fn test_read_undefined() {
        let (tree, x, y) = sample();
        assert_eq!(tree.read(x).unwrap(), &Value::Int(3));
        assert!(matches!(tree.read(y), Err(OrchidError::ReadOfUndefined { .. })));
    }

    #[test]
    fn test_incremental_hash_matches_recompute() {
        let (mut tree, x, y) = sample();
        let initial = tree.state_hash();
        assert_eq!(initial, tree.recompute_hash());
        tree.set_raw(x, CellValue::Defined(Value::Int(4)));
        tree.set_raw(y, CellValue::Defined(Value::Bool(true)));
        assert_eq!(tree.state_hash(), tree.recompute_hash());
        assert_ne!(tree.state_hash(), initial);
        tree.set_raw(x, CellValue::Defined(Value::Int(3)));
        tree.set_raw(y, CellValue::Undefined);
        assert_eq!(tree.state_hash(), initial);
    }

    #[test]
    fn test_replace_checked_detects_mismatch() {
        let (mut tree, x, _) = sample();
        let stale = CellValue::Defined(Value::Int(9));
        let err = tree.replace_checked(x, &stale, CellValue::Defined(Value::Int(1))).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(tree.read(x).unwrap(), &Value::Int(3));
    }

    #[test]
    fn test_render_lists_cells() {
        let (tree, _, _) = sample();
        let text = tree.render();
        assert!(text.contains("x: Integer[0, 10) = 3"));
        assert!(text.contains("y: Boolean = UnDefined"));
    }
}
