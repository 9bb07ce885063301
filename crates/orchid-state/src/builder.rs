//! Tree builder
//!
//! Hierarchy is described ahead of time with explicit calls and then frozen
//! into a [`StateTree`]. Nothing can be added after `freeze`.

use orchid_core::{
    CellId, CellValue, LeafKind, NameHash, NodeId, OrchidError, OrchidResult, PortId, Value,
};

use crate::tree::{CellSlot, NodeSlot};
use crate::{Child, PortDirection, PortQueue, Selector, StateTree, UnionSlot};

/// Ids produced by [`TreeBuilder::add_union`]
#[derive(Clone, Debug)]
pub struct UnionHandle {
    pub node: NodeId,
    pub options: Vec<NodeId>,
    pub discriminant: CellId,
}

pub struct TreeBuilder {
    nodes: Vec<NodeSlot>,
    cells: Vec<CellSlot>,
    ports: Vec<PortQueue>,
}

impl TreeBuilder {
    pub fn new(root_name: &str) -> Self {
        TreeBuilder {
            nodes: vec![NodeSlot {
                name: root_name.to_string(),
                path: root_name.to_string(),
                parent: None,
                children: Vec::new(),
                union: None,
                selectors: Vec::new(),
            }],
            cells: Vec::new(),
            ports: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn has_node(&self, node: NodeId) -> bool {
        node.index() < self.nodes.len()
    }

    pub fn node_path(&self, node: NodeId) -> &str {
        &self.nodes[node.index()].path
    }

    /// Check that `parent` exists, accepts children and has no child `name`
    fn claim(&self, parent: NodeId, name: &str) -> OrchidResult<String> {
        let slot = self
            .nodes
            .get(parent.index())
            .ok_or_else(|| OrchidError::UnknownName(format!("{:?}", parent)))?;
        if name.is_empty() || name.contains('.') || name.contains('#') {
            return Err(OrchidError::InvalidParameter(format!("bad child name {:?}", name)));
        }
        if slot.union.is_some() {
            return Err(OrchidError::InvalidParameter(format!(
                "options of union {} are fixed",
                slot.path
            )));
        }
        let path = format!("{}.{}", slot.path, name);
        if slot.children.iter().any(|(child, _)| child == name) {
            return Err(OrchidError::DuplicateName(path));
        }
        Ok(path)
    }

    fn push_node(&mut self, parent: NodeId, name: &str, path: String, selectors: Vec<Selector>) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(NodeSlot {
            name: name.to_string(),
            path,
            parent: Some(parent),
            children: Vec::new(),
            union: None,
            selectors,
        });
        self.nodes[parent.index()]
            .children
            .push((name.to_string(), Child::Node(id)));
        id
    }

    fn push_cell(
        &mut self,
        owner: NodeId,
        name: &str,
        path: String,
        kind: LeafKind,
        initial: Option<Value>,
    ) -> OrchidResult<CellId> {
        let value = match initial {
            Some(v) => {
                let shown = v.to_string();
                let cast = kind.check_and_cast(v).map_err(|reason| OrchidError::CastRejected {
                    cell: path.clone(),
                    value: shown,
                    reason,
                })?;
                CellValue::Defined(cast)
            }
            None => CellValue::Undefined,
        };
        let name_hash = NameHash::of(&path);
        let contribution = name_hash.contribution(kind.hash_value(&value));
        let id = CellId::new(self.cells.len());
        self.cells.push(CellSlot {
            owner,
            name: name.to_string(),
            path,
            kind,
            value,
            name_hash,
            contribution,
            selectors: self.nodes[owner.index()].selectors.clone(),
        });
        Ok(id)
    }

    pub fn add_node(&mut self, parent: NodeId, name: &str) -> OrchidResult<NodeId> {
        let path = self.claim(parent, name)?;
        let selectors = self.nodes[parent.index()].selectors.clone();
        Ok(self.push_node(parent, name, path, selectors))
    }

    /// Declare a cell; `None` leaves it Undefined
    pub fn add_cell(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: LeafKind,
        initial: Option<Value>,
    ) -> OrchidResult<CellId> {
        check_kind(name, &kind)?;
        let path = self.claim(parent, name)?;
        let id = self.push_cell(parent, name, path, kind, initial)?;
        self.nodes[parent.index()]
            .children
            .push((name.to_string(), Child::Cell(id)));
        Ok(id)
    }

    /// Declare a union slot with one option node per name, `selected` live
    pub fn add_union(
        &mut self,
        parent: NodeId,
        name: &str,
        options: &[&str],
        selected: usize,
    ) -> OrchidResult<UnionHandle> {
        if options.is_empty() || selected >= options.len() {
            return Err(OrchidError::InvalidParameter(format!(
                "union {} selects option {} of {}",
                name,
                selected,
                options.len()
            )));
        }
        let path = self.claim(parent, name)?;
        let selectors = self.nodes[parent.index()].selectors.clone();
        let node = self.push_node(parent, name, path.clone(), selectors.clone());

        let discriminant = self.push_cell(
            node,
            "#selected",
            format!("{}#selected", path),
            LeafKind::bounded(options.len() as i64),
            Some(Value::Int(selected as i64)),
        )?;

        let mut option_ids = Vec::with_capacity(options.len());
        for (index, option) in options.iter().enumerate() {
            let option_path = self.claim(node, option)?;
            let mut option_selectors = selectors.clone();
            option_selectors.push(Selector { discriminant, option: index as i64 });
            option_ids.push(self.push_node(node, option, option_path, option_selectors));
        }
        self.nodes[node.index()].union = Some(UnionSlot {
            options: option_ids.clone(),
            discriminant,
        });
        Ok(UnionHandle { node, options: option_ids, discriminant })
    }

    /// Declare a port whose values are cast by `element`
    pub fn add_port(
        &mut self,
        parent: NodeId,
        name: &str,
        direction: PortDirection,
        element: LeafKind,
    ) -> OrchidResult<PortId> {
        check_kind(name, &element)?;
        let path = self.claim(parent, name)?;
        let read_index = self.push_cell(
            parent,
            &format!("{}#read", name),
            format!("{}#read", path),
            LeafKind::Integer { min: Some(0), max: None },
            Some(Value::Int(0)),
        )?;
        let id = PortId::new(self.ports.len());
        self.ports.push(PortQueue {
            owner: parent,
            path,
            direction,
            element,
            entries: Vec::new(),
            read_index,
        });
        self.nodes[parent.index()]
            .children
            .push((name.to_string(), Child::Port(id)));
        Ok(id)
    }

    /// Make `target` reachable as `parent.name`
    ///
    /// Only cells and ports can be bound; the node hierarchy stays a tree.
    pub fn bind(&mut self, parent: NodeId, name: &str, target: Child) -> OrchidResult<()> {
        match target {
            Child::Cell(c) if c.index() < self.cells.len() => {}
            Child::Port(p) if p.index() < self.ports.len() => {}
            _ => {
                return Err(OrchidError::InvalidParameter(format!(
                    "cannot bind {:?} as {}",
                    target, name
                )))
            }
        }
        self.claim(parent, name)?;
        self.nodes[parent.index()].children.push((name.to_string(), target));
        Ok(())
    }

    pub fn freeze(self) -> StateTree {
        let hash = self.cells.iter().fold(0, |acc, cell| acc ^ cell.contribution);
        StateTree {
            nodes: self.nodes,
            cells: self.cells,
            ports: self.ports,
            hash,
            ports_open: true,
        }
    }
}

/// Refuse a leaf kind declared for `name` that could never hold a value
pub fn check_kind(name: &str, kind: &LeafKind) -> OrchidResult<()> {
    kind.check_declaration()
        .map_err(|reason| OrchidError::InvalidParameter(format!("{}: {}", name, reason)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut b = TreeBuilder::new("top");
        let root = b.root();
        b.add_cell(root, "a", LeafKind::Boolean, None).unwrap();
        assert!(matches!(
            b.add_node(root, "a"),
            Err(OrchidError::DuplicateName(p)) if p == "top.a"
        ));
        assert!(b.add_cell(root, "b.c", LeafKind::Boolean, None).is_err());
    }

    #[test]
    fn test_initial_value_is_cast() {
        let mut b = TreeBuilder::new("top");
        let root = b.root();
        let c = b.add_cell(root, "m", LeafKind::modulo(4), Some(Value::Int(9))).unwrap();
        assert!(b.add_cell(root, "n", LeafKind::bounded(4), Some(Value::Int(9))).is_err());
        let tree = b.freeze();
        assert_eq!(tree.read(c).unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_zero_modulus_declaration_rejected() {
        let mut b = TreeBuilder::new("top");
        let root = b.root();
        assert!(matches!(
            b.add_cell(root, "m", LeafKind::modulo(0), None),
            Err(OrchidError::InvalidParameter(_))
        ));
        assert!(matches!(
            b.add_port(root, "p", PortDirection::Stimulus, LeafKind::modulo(-2)),
            Err(OrchidError::InvalidParameter(_))
        ));
        // the refused name stays free
        b.add_cell(root, "m", LeafKind::modulo(3), None).unwrap();
    }

    #[test]
    fn test_union_selection_and_liveness() {
        let mut b = TreeBuilder::new("top");
        let root = b.root();
        let u = b.add_union(root, "g", &["left", "right"], 0).unwrap();
        let l = b.add_cell(u.options[0], "v", LeafKind::bounded(8), Some(Value::Int(1))).unwrap();
        let r = b.add_cell(u.options[1], "v", LeafKind::bounded(8), Some(Value::Int(2))).unwrap();
        assert!(b.add_node(u.node, "extra").is_err());
        let tree = b.freeze();

        assert_eq!(tree.selected_option(u.node).unwrap(), 0);
        assert!(tree.is_live(l));
        assert!(!tree.is_live(r));
        assert!(matches!(tree.read(r), Err(OrchidError::ReadOfUnselected { .. })));
        assert_eq!(tree.lookup_cell("top.g.right.v").unwrap(), r);
        assert!(tree.render().contains("right (unselected)"));
    }

    #[test]
    fn test_nested_union_requires_both_selectors() {
        let mut b = TreeBuilder::new("top");
        let root = b.root();
        let outer = b.add_union(root, "outer", &["a", "b"], 1).unwrap();
        let inner = b.add_union(outer.options[0], "inner", &["x", "y"], 0).unwrap();
        let c = b.add_cell(inner.options[0], "c", LeafKind::Boolean, Some(Value::Bool(true))).unwrap();
        let tree = b.freeze();
        assert!(!tree.is_live(c));
        assert!(!tree.is_live(inner.discriminant));
    }

    #[test]
    fn test_bind_aliases_cell() {
        let mut b = TreeBuilder::new("top");
        let root = b.root();
        let sub = b.add_node(root, "sub").unwrap();
        let x = b.add_cell(root, "x", LeafKind::Boolean, None).unwrap();
        b.bind(sub, "x_in", Child::Cell(x)).unwrap();
        let n = b.add_node(root, "n").unwrap();
        assert!(b.bind(sub, "loop", Child::Node(n)).is_err());
        let tree = b.freeze();
        assert_eq!(tree.resolve(sub, "x_in").unwrap(), Child::Cell(x));
        assert_eq!(tree.cell_path(x), "top.x");
    }
}
