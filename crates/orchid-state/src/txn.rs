//! Transaction engine
//!
//! An [`Invocation`] is the record left behind by running one rule body
//! through a [`Txn`]. Writes are visible to later reads of the same body.
//! The record keeps, per cell, the value before the first write and after
//! the last one, so it can be reverted and re-applied against the tree.
//!
//! A guard failure inside the body reverts every write and drops buffered
//! output; any other error also reverts before it is reported.

use std::collections::HashMap;

use tracing::trace;

use orchid_core::{
    CastRejection, CellId, CellValue, NodeId, OrchidError, OrchidResult, PortId, Value,
};

use crate::{Child, PortDirection, StateTree};

/// How an invocation ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Body completed, its changes are live
    Applied,
    /// A guard failed, nothing changed
    Guarded,
    /// Body raised an error, nothing changed
    Failed(OrchidError),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    pub fn is_guarded(&self) -> bool {
        matches!(self, Outcome::Guarded)
    }

    pub fn error(&self) -> Option<&OrchidError> {
        match self {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// How a nested scope ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeOutcome {
    Completed,
    Guarded,
}

/// One cell's net change within an invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub cell: CellId,
    pub before: CellValue,
    pub after: CellValue,
}

#[derive(Debug)]
struct JournalEntry {
    cell: CellId,
    prior: CellValue,
    /// First write of this cell in the invocation
    created: bool,
}

/// Handle passed to rule bodies; the only way to mutate cells
pub struct Txn<'t> {
    tree: &'t mut StateTree,
    owner: NodeId,
    changes: Vec<Change>,
    index: HashMap<CellId, usize>,
    journal: Vec<JournalEntry>,
    output: Vec<String>,
}

impl<'t> Txn<'t> {
    fn new(tree: &'t mut StateTree, owner: NodeId) -> Self {
        Txn {
            tree,
            owner,
            changes: Vec::new(),
            index: HashMap::new(),
            journal: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Node the running rule belongs to
    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn tree(&self) -> &StateTree {
        self.tree
    }

    /// Resolve a cell name relative to the owner node
    pub fn cell(&self, name: &str) -> OrchidResult<CellId> {
        match self.tree.resolve(self.owner, name)? {
            Child::Cell(cell) => Ok(cell),
            _ => Err(OrchidError::UnknownName(format!("{} is not a cell", name))),
        }
    }

    pub fn node(&self, name: &str) -> OrchidResult<NodeId> {
        match self.tree.resolve(self.owner, name)? {
            Child::Node(node) => Ok(node),
            _ => Err(OrchidError::UnknownName(format!("{} is not a node", name))),
        }
    }

    pub fn port(&self, name: &str) -> OrchidResult<PortId> {
        match self.tree.resolve(self.owner, name)? {
            Child::Port(port) => Ok(port),
            _ => Err(OrchidError::UnknownName(format!("{} is not a port", name))),
        }
    }

    pub fn read(&self, cell: CellId) -> OrchidResult<Value> {
        self.tree.read(cell).cloned()
    }

    pub fn read_int(&self, cell: CellId) -> OrchidResult<i64> {
        let value = self.tree.read(cell)?;
        value.as_int().ok_or_else(|| self.shape_error(cell, "int", value))
    }

    pub fn read_bool(&self, cell: CellId) -> OrchidResult<bool> {
        let value = self.tree.read(cell)?;
        value.as_bool().ok_or_else(|| self.shape_error(cell, "bool", value))
    }

    pub fn read_enum(&self, cell: CellId) -> OrchidResult<u32> {
        let value = self.tree.read(cell)?;
        value.as_enum().ok_or_else(|| self.shape_error(cell, "enum", value))
    }

    fn shape_error(&self, cell: CellId, expected: &'static str, value: &Value) -> OrchidError {
        OrchidError::CastRejected {
            cell: self.tree.cell_path(cell).to_string(),
            value: value.to_string(),
            reason: CastRejection::WrongShape { expected, found: value.shape() },
        }
    }

    /// Cast `value` by the cell's kind and write it
    pub fn write(&mut self, cell: CellId, value: impl Into<Value>) -> OrchidResult<()> {
        let value = value.into();
        let shown = value.to_string();
        let cast = self
            .tree
            .kind(cell)
            .check_and_cast(value)
            .map_err(|reason| OrchidError::CastRejected {
                cell: self.tree.cell_path(cell).to_string(),
                value: shown,
                reason,
            })?;
        self.store(cell, CellValue::Defined(cast))
    }

    /// Return a cell to Undefined
    pub fn undefine(&mut self, cell: CellId) -> OrchidResult<()> {
        self.store(cell, CellValue::Undefined)
    }

    fn store(&mut self, cell: CellId, value: CellValue) -> OrchidResult<()> {
        if !self.tree.is_live(cell) {
            return Err(OrchidError::ReadOfUnselected {
                cell: self.tree.cell_path(cell).to_string(),
            });
        }
        let prior = self.tree.peek(cell).clone();
        match self.index.get(&cell) {
            Some(&i) => {
                self.changes[i].after = value.clone();
                self.journal.push(JournalEntry { cell, prior, created: false });
            }
            None => {
                self.index.insert(cell, self.changes.len());
                self.changes.push(Change {
                    cell,
                    before: prior.clone(),
                    after: value.clone(),
                });
                self.journal.push(JournalEntry { cell, prior, created: true });
            }
        }
        self.tree.set_raw(cell, value);
        Ok(())
    }

    /// Abort the invocation (or the innermost scope) unless `condition` holds
    #[inline]
    pub fn guard(&self, condition: bool) -> OrchidResult<()> {
        if condition {
            Ok(())
        } else {
            Err(OrchidError::GuardFailed)
        }
    }

    /// Report a defect in the model unless `condition` holds
    pub fn ensure(&self, condition: bool, message: &str) -> OrchidResult<()> {
        if condition {
            Ok(())
        } else {
            Err(OrchidError::RuleFailed(message.to_string()))
        }
    }

    /// Switch the live option of a union node
    pub fn select(&mut self, union: NodeId, option: usize) -> OrchidResult<()> {
        let discriminant = self.tree.union_slot(union)?.discriminant;
        self.write(discriminant, Value::Int(option as i64))
    }

    pub fn selected(&self, union: NodeId) -> OrchidResult<usize> {
        self.tree.selected_option(union)
    }

    /// Buffer an output line, shown only if the invocation is not guarded
    pub fn print(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    /// Run `body` as a nested scope
    ///
    /// A guard failure inside rolls back the scope's writes and output and
    /// returns `ScopeOutcome::Guarded`; other errors propagate.
    pub fn scope<F>(&mut self, body: F) -> OrchidResult<ScopeOutcome>
    where
        F: FnOnce(&mut Self) -> OrchidResult<()>,
    {
        let mark = self.journal.len();
        let output_mark = self.output.len();
        match body(self) {
            Ok(()) => Ok(ScopeOutcome::Completed),
            Err(e) if e.is_guard() => {
                self.unwind(mark);
                self.output.truncate(output_mark);
                Ok(ScopeOutcome::Guarded)
            }
            Err(e) => Err(e),
        }
    }

    /// Roll back journal entries above `mark`, newest first
    fn unwind(&mut self, mark: usize) {
        while self.journal.len() > mark {
            let Some(entry) = self.journal.pop() else { break };
            if entry.created {
                self.changes.pop();
                self.index.remove(&entry.cell);
            } else if let Some(&i) = self.index.get(&entry.cell) {
                self.changes[i].after = entry.prior.clone();
            }
            self.tree.set_raw(entry.cell, entry.prior);
        }
    }

    fn next_entry(&self, port: PortId, direction: PortDirection) -> OrchidResult<(Value, CellId, i64)> {
        let queue = self.tree.port(port);
        if queue.direction() != direction {
            return Err(OrchidError::InvalidParameter(format!(
                "{} is a {:?} port",
                queue.path(),
                queue.direction()
            )));
        }
        let cell = queue.read_index();
        let consumed = self.read_int(cell)?;
        match queue.entries().get(consumed as usize) {
            Some(value) => Ok((value.clone(), cell, consumed)),
            None if self.tree.ports_open() => Err(OrchidError::NeedMoreStimulus {
                port: queue.path().to_string(),
            }),
            None => Err(OrchidError::GuardFailed),
        }
    }

    /// Look at the next stimulus value without consuming it
    pub fn peek(&self, port: PortId) -> OrchidResult<Value> {
        self.next_entry(port, PortDirection::Stimulus).map(|(value, _, _)| value)
    }

    /// Consume the next stimulus value
    pub fn pop(&mut self, port: PortId) -> OrchidResult<Value> {
        let (value, cell, consumed) = self.next_entry(port, PortDirection::Stimulus)?;
        self.write(cell, Value::Int(consumed + 1))?;
        Ok(value)
    }

    /// Reproduce an output: guards that the next observed value equals `value`
    /// and consumes it
    pub fn emit(&mut self, port: PortId, value: impl Into<Value>) -> OrchidResult<()> {
        let value = value.into();
        let shown = value.to_string();
        let queue = self.tree.port(port);
        let expected = queue
            .element()
            .check_and_cast(value)
            .map_err(|reason| OrchidError::CastRejected {
                cell: queue.path().to_string(),
                value: shown,
                reason,
            })?;
        let (observed, cell, consumed) = self.next_entry(port, PortDirection::Observed)?;
        self.guard(observed == expected)?;
        self.write(cell, Value::Int(consumed + 1))
    }

    /// Entries left to consume on a port
    pub fn available(&self, port: PortId) -> usize {
        self.tree.remaining(port)
    }

    fn rollback(mut self) {
        self.unwind(0);
    }

    fn finish(self) -> (Vec<Change>, Vec<String>) {
        (self.changes, self.output)
    }
}

/// Record of one executed rule body
#[derive(Clone, Debug)]
pub struct Invocation {
    label: String,
    changes: Vec<Change>,
    outcome: Outcome,
    output: Vec<String>,
    hash_before: u64,
    hash_after: u64,
}

impl Invocation {
    /// Run `body` against `tree` on behalf of a rule owned by `owner`
    ///
    /// On `Applied` the changes stay live in the tree; on any other outcome
    /// the tree is exactly as before.
    pub fn execute<F>(tree: &mut StateTree, label: impl Into<String>, owner: NodeId, body: F) -> Invocation
    where
        F: FnOnce(&mut Txn<'_>) -> OrchidResult<()>,
    {
        let label = label.into();
        let hash_before = tree.state_hash();
        let mut txn = Txn::new(tree, owner);
        let (changes, output, outcome) = match body(&mut txn) {
            Ok(()) => {
                let (changes, output) = txn.finish();
                (changes, output, Outcome::Applied)
            }
            Err(e) => {
                txn.rollback();
                let outcome = if e.is_guard() { Outcome::Guarded } else { Outcome::Failed(e) };
                (Vec::new(), Vec::new(), outcome)
            }
        };
        let hash_after = tree.state_hash();
        trace!(label = %label, outcome = ?outcome, changes = changes.len(), "invocation");
        Invocation {
            label,
            changes,
            outcome,
            output,
            hash_before,
            hash_after,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_applied(&self) -> bool {
        self.outcome.is_applied()
    }

    pub fn is_guarded(&self) -> bool {
        self.outcome.is_guarded()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Model state hash before the body ran
    pub fn hash_before(&self) -> u64 {
        self.hash_before
    }

    /// Model state hash the body produced
    pub fn hash_after(&self) -> u64 {
        self.hash_after
    }

    /// Re-apply the recorded changes, which must find their before-values live
    ///
    /// On a mismatch the changes already written are undone, so the tree is
    /// left as it was found.
    pub fn apply(&self, tree: &mut StateTree) -> OrchidResult<()> {
        for (done, change) in self.changes.iter().enumerate() {
            if let Err(e) = tree.replace_checked(change.cell, &change.before, change.after.clone()) {
                for undo in self.changes[..done].iter().rev() {
                    tree.set_raw(undo.cell, undo.before.clone());
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Undo the recorded changes, which must find their after-values live
    ///
    /// All-or-nothing, like `apply`.
    pub fn revert(&self, tree: &mut StateTree) -> OrchidResult<()> {
        let total = self.changes.len();
        for (done, change) in self.changes.iter().rev().enumerate() {
            if let Err(e) = tree.replace_checked(change.cell, &change.after, change.before.clone()) {
                for redo in &self.changes[total - done..] {
                    tree.set_raw(redo.cell, redo.after.clone());
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Buffered output lines, prefixed with the label when `headers` is set
    pub fn flush_output(&self, headers: bool) -> Vec<String> {
        self.output
            .iter()
            .map(|line| {
                if headers {
                    format!("{}: {}", self.label, line)
                } else {
                    line.clone()
                }
            })
            .collect()
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TreeBuilder;
    use orchid_core::LeafKind;
    use proptest::prelude::*;

    struct Fixture {
        tree: StateTree,
        a: CellId,
        b: CellId,
        c: CellId,
    }

    fn fixture() -> Fixture {
        let mut builder = TreeBuilder::new("top");
        let root = builder.root();
        let a = builder.add_cell(root, "a", LeafKind::bounded(100), Some(Value::Int(1))).unwrap();
        let b = builder.add_cell(root, "b", LeafKind::bounded(100), Some(Value::Int(2))).unwrap();
        let c = builder.add_cell(root, "c", LeafKind::bounded(100), None).unwrap();
        Fixture { tree: builder.freeze(), a, b, c }
    }

    #[test]
    fn test_applied_changes_stay_live() {
        let Fixture { mut tree, a, b, .. } = fixture();
        let inv = Invocation::execute(&mut tree, "swap", NodeId::ROOT, |t| {
            let x = t.read_int(a)?;
            let y = t.read_int(b)?;
            t.write(a, y)?;
            t.write(b, x)?;
            t.print("swapped");
            Ok(())
        });
        assert!(inv.is_applied());
        assert_eq!(tree.read(a).unwrap(), &Value::Int(2));
        assert_eq!(tree.read(b).unwrap(), &Value::Int(1));
        assert_eq!(inv.changes().len(), 2);
        assert_eq!(inv.flush_output(true), vec!["swap: swapped".to_string()]);
        assert_eq!(inv.hash_after(), tree.state_hash());
    }

    #[test]
    fn test_reads_see_own_writes() {
        let Fixture { mut tree, a, .. } = fixture();
        let inv = Invocation::execute(&mut tree, "twice", NodeId::ROOT, |t| {
            t.write(a, 10)?;
            let seen = t.read_int(a)?;
            t.write(a, seen + 5)
        });
        assert!(inv.is_applied());
        assert_eq!(inv.changes()[0].before, CellValue::Defined(Value::Int(1)));
        assert_eq!(inv.changes()[0].after, CellValue::Defined(Value::Int(15)));
    }

    #[test]
    fn test_guard_reverts_everything() {
        let Fixture { mut tree, a, b, c } = fixture();
        let before = tree.snapshot();
        let hash = tree.state_hash();
        let inv = Invocation::execute(&mut tree, "doomed", NodeId::ROOT, |t| {
            t.write(a, 50)?;
            t.write(b, 51)?;
            t.write(c, 52)?;
            t.print("never shown");
            t.guard(false)
        });
        assert!(inv.is_guarded());
        assert!(inv.changes().is_empty());
        assert!(inv.flush_output(false).is_empty());
        assert_eq!(tree.snapshot(), before);
        assert_eq!(tree.state_hash(), hash);
    }

    #[test]
    fn test_defect_reverts_then_reports() {
        let Fixture { mut tree, a, c, .. } = fixture();
        let before = tree.snapshot();
        let inv = Invocation::execute(&mut tree, "broken", NodeId::ROOT, |t| {
            t.write(a, 7)?;
            t.read_int(c)?;
            Ok(())
        });
        assert!(matches!(inv.outcome(), Outcome::Failed(OrchidError::ReadOfUndefined { .. })));
        assert_eq!(tree.snapshot(), before);
    }

    #[test]
    fn test_cast_rejection_is_failure() {
        let Fixture { mut tree, a, .. } = fixture();
        let inv = Invocation::execute(&mut tree, "overflow", NodeId::ROOT, |t| t.write(a, 100));
        assert!(matches!(inv.outcome(), Outcome::Failed(OrchidError::CastRejected { .. })));
    }

    #[test]
    fn test_revert_then_apply() {
        let Fixture { mut tree, a, b, .. } = fixture();
        let initial = tree.snapshot();
        let initial_hash = tree.state_hash();
        let inv = Invocation::execute(&mut tree, "bump", NodeId::ROOT, |t| {
            let x = t.read_int(a)?;
            t.write(a, x + 1)?;
            t.write(b, x + 2)
        });
        let after = tree.snapshot();
        let after_hash = tree.state_hash();

        inv.revert(&mut tree).unwrap();
        assert_eq!(tree.snapshot(), initial);
        assert_eq!(tree.state_hash(), initial_hash);

        inv.apply(&mut tree).unwrap();
        assert_eq!(tree.snapshot(), after);
        assert_eq!(tree.state_hash(), after_hash);

        assert!(matches!(inv.apply(&mut tree), Err(OrchidError::StateConsistency { .. })));
    }

    #[test]
    fn test_failed_apply_leaves_no_partial_writes() {
        let Fixture { mut tree, a, b, .. } = fixture();
        let inv = Invocation::execute(&mut tree, "pair", NodeId::ROOT, |t| {
            t.write(b, 7)?;
            t.write(a, 2)
        });
        inv.revert(&mut tree).unwrap();
        let other = Invocation::execute(&mut tree, "other", NodeId::ROOT, |t| t.write(a, 3));
        assert!(other.is_applied());
        let before = tree.snapshot();
        let before_hash = tree.state_hash();

        // b matches, a does not
        assert!(matches!(inv.apply(&mut tree), Err(OrchidError::StateConsistency { .. })));
        assert_eq!(tree.snapshot(), before);
        assert_eq!(tree.state_hash(), before_hash);
        assert_eq!(tree.recompute_hash(), before_hash);
    }

    #[test]
    fn test_failed_revert_leaves_no_partial_writes() {
        let Fixture { mut tree, a, b, .. } = fixture();
        let inv = Invocation::execute(&mut tree, "pair", NodeId::ROOT, |t| {
            t.write(a, 5)?;
            t.write(b, 6)
        });
        // a no longer holds the recorded after-value
        let other = Invocation::execute(&mut tree, "other", NodeId::ROOT, |t| t.write(a, 9));
        assert!(other.is_applied());
        let before = tree.snapshot();
        let before_hash = tree.state_hash();

        assert!(matches!(inv.revert(&mut tree), Err(OrchidError::StateConsistency { .. })));
        assert_eq!(tree.snapshot(), before);
        assert_eq!(tree.state_hash(), before_hash);
    }

    #[test]
    fn test_nested_scope_rolls_back_only_itself() {
        let Fixture { mut tree, a, b, c } = fixture();
        let inv = Invocation::execute(&mut tree, "nested", NodeId::ROOT, |t| {
            t.write(a, 10)?;
            t.print("outer");
            let inner = t.scope(|t| {
                t.write(a, 20)?;
                t.write(b, 20)?;
                t.print("inner");
                t.guard(false)
            })?;
            assert_eq!(inner, ScopeOutcome::Guarded);
            assert_eq!(t.read_int(a)?, 10);
            let kept = t.scope(|t| t.write(c, 30))?;
            assert_eq!(kept, ScopeOutcome::Completed);
            Ok(())
        });
        assert!(inv.is_applied());
        assert_eq!(tree.read(a).unwrap(), &Value::Int(10));
        assert_eq!(tree.read(b).unwrap(), &Value::Int(2));
        assert_eq!(tree.read(c).unwrap(), &Value::Int(30));
        assert_eq!(inv.output(), ["outer".to_string()]);
        let cells: Vec<_> = inv.changes().iter().map(|ch| ch.cell).collect();
        assert_eq!(cells, vec![a, c]);
    }

    #[test]
    fn test_scope_propagates_defects() {
        let Fixture { mut tree, a, c, .. } = fixture();
        let inv = Invocation::execute(&mut tree, "scoped-defect", NodeId::ROOT, |t| {
            t.write(a, 3)?;
            t.scope(|t| t.read_int(c).map(|_| ()))?;
            Ok(())
        });
        assert!(matches!(inv.outcome(), Outcome::Failed(OrchidError::ReadOfUndefined { .. })));
        assert_eq!(tree.read(a).unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_union_select_preserves_deselected_state() {
        let mut builder = TreeBuilder::new("top");
        let root = builder.root();
        let u = builder.add_union(root, "g", &["x", "y"], 0).unwrap();
        let xv = builder.add_cell(u.options[0], "v", LeafKind::bounded(10), Some(Value::Int(4))).unwrap();
        let yv = builder.add_cell(u.options[1], "v", LeafKind::bounded(10), None).unwrap();
        let mut tree = builder.freeze();

        let inv = Invocation::execute(&mut tree, "switch", NodeId::ROOT, |t| {
            t.write(xv, 5)?;
            t.select(u.node, 1)?;
            t.write(yv, 9)?;
            t.read_int(xv).map(|_| ())
        });
        assert!(matches!(inv.outcome(), Outcome::Failed(OrchidError::ReadOfUnselected { .. })));

        let inv = Invocation::execute(&mut tree, "switch", NodeId::ROOT, |t| {
            t.write(xv, 5)?;
            t.select(u.node, 1)?;
            t.write(yv, 9)
        });
        assert!(inv.is_applied());
        assert_eq!(tree.selected_option(u.node).unwrap(), 1);
        assert_eq!(tree.peek(xv), &CellValue::Defined(Value::Int(5)));

        let back = Invocation::execute(&mut tree, "back", NodeId::ROOT, |t| {
            t.select(u.node, 0)?;
            t.read_int(xv).map(|_| ())
        });
        assert!(back.is_applied());
        assert_eq!(tree.read(xv).unwrap(), &Value::Int(5));
        assert!(Invocation::execute(&mut tree, "bad", NodeId::ROOT, |t| t.select(u.node, 2))
            .outcome()
            .error()
            .is_some());
    }

    #[test]
    fn test_ports_pop_and_emit() {
        let mut builder = TreeBuilder::new("top");
        let root = builder.root();
        let req = builder
            .add_port(root, "req", PortDirection::Stimulus, LeafKind::bounded(10))
            .unwrap();
        let done = builder
            .add_port(root, "done", PortDirection::Observed, LeafKind::bounded(10))
            .unwrap();
        let mut tree = builder.freeze();

        let starve = Invocation::execute(&mut tree, "take", NodeId::ROOT, |t| t.pop(req).map(|_| ()));
        assert!(matches!(starve.outcome(), Outcome::Failed(OrchidError::NeedMoreStimulus { .. })));

        tree.push(req, Value::Int(4)).unwrap();
        tree.push(done, Value::Int(4)).unwrap();
        assert_eq!(tree.pending_stimulus(), 1);
        assert_eq!(tree.unmatched_outputs(), 1);

        let miss = Invocation::execute(&mut tree, "wrong", NodeId::ROOT, |t| t.emit(done, 5));
        assert!(miss.is_guarded());

        let pass = Invocation::execute(&mut tree, "echo", NodeId::ROOT, |t| {
            let v = t.pop(req)?;
            t.emit(done, v)
        });
        assert!(pass.is_applied());
        assert_eq!(tree.pending_stimulus(), 0);
        assert_eq!(tree.unmatched_outputs(), 0);

        pass.revert(&mut tree).unwrap();
        assert_eq!(tree.unmatched_outputs(), 1);
        pass.apply(&mut tree).unwrap();

        tree.close_ports();
        let closed = Invocation::execute(&mut tree, "take", NodeId::ROOT, |t| t.pop(req).map(|_| ()));
        assert!(closed.is_guarded());
    }

    proptest! {
        #[test]
        fn prop_guarded_writes_never_observable(values in proptest::collection::vec(0i64..100, 1..8)) {
            let Fixture { mut tree, a, b, c } = fixture();
            let before = tree.snapshot();
            let cells = [a, b, c];
            let inv = Invocation::execute(&mut tree, "many", NodeId::ROOT, |t| {
                for (i, v) in values.iter().enumerate() {
                    t.write(cells[i % 3], *v)?;
                }
                t.guard(false)
            });
            prop_assert!(inv.is_guarded());
            prop_assert_eq!(tree.snapshot(), before);
        }

        #[test]
        fn prop_revert_restores_hash(values in proptest::collection::vec(0i64..100, 1..8)) {
            let Fixture { mut tree, a, b, c } = fixture();
            let before = tree.snapshot();
            let hash = tree.state_hash();
            let cells = [a, b, c];
            let inv = Invocation::execute(&mut tree, "many", NodeId::ROOT, |t| {
                for (i, v) in values.iter().enumerate() {
                    t.write(cells[i % 3], *v)?;
                }
                Ok(())
            });
            prop_assert_eq!(tree.state_hash(), tree.recompute_hash());
            inv.revert(&mut tree).unwrap();
            prop_assert_eq!(tree.snapshot(), before);
            prop_assert_eq!(tree.state_hash(), hash);
        }
    }
}
