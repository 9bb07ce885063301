//! Models - a frozen state tree with its rules and clocks

use std::rc::Rc;

use tracing::debug;

use orchid_core::{ClockId, HandlerId, NodeId, OrchidError, OrchidResult, PortId, RuleId, Value};
use orchid_state::{check_kind, Invocation, Outcome, StateTree, TreeBuilder, Txn};
use orchid_time::{ClockClient, ClockDecl, ClockQuery, ClockSet};

use crate::{Handler, HandlerRole, ParamDecl, Rule, RuleArgs, RuleQuery, RuleSet};

/// Result of firing one clock edge
#[derive(Debug)]
pub struct EdgeReport {
    pub clock: ClockId,
    pub time_ps: u64,
    /// Invocations applied together on this edge
    pub applied: Vec<Invocation>,
    pub guarded: usize,
}

/// A complete model: state, rules and clocks
pub struct Model {
    tree: StateTree,
    handlers: Vec<Handler>,
    rules: RuleSet,
    clocks: ClockSet,
}

impl Model {
    pub fn tree(&self) -> &StateTree {
        &self.tree
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    pub fn handler(&self, id: HandlerId) -> Option<&Handler> {
        self.handlers.get(id.index())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> OrchidResult<&Rule> {
        self.rules
            .get(id)
            .ok_or_else(|| OrchidError::UnknownName(id.to_string()))
    }

    pub fn clocks(&self) -> &ClockSet {
        &self.clocks
    }

    pub fn clocks_mut(&mut self) -> &mut ClockSet {
        &mut self.clocks
    }

    /// Atomic rules by owner, handler name and partial parameters
    pub fn find_rule(&self) -> RuleQuery<'_> {
        self.rules.query()
    }

    /// Independently schedulable clocks by name and owner subtree
    pub fn find_clock(&self) -> ClockQuery<'_> {
        self.clocks.query()
    }

    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.tree.state_hash()
    }

    /// Run one rule as a transaction; applied changes stay live
    pub fn invoke(&mut self, id: RuleId) -> Invocation {
        let Model { tree, handlers, rules, .. } = self;
        let Some(rule) = rules.get(id) else {
            return Invocation::execute(tree, id.to_string(), NodeId::ROOT, |_| {
                Err(OrchidError::UnknownName(id.to_string()))
            });
        };
        let body = handlers[rule.handler.index()].body();
        Invocation::execute(tree, rule.label.as_str(), rule.owner, |txn| (**body)(txn, &rule.args))
    }

    /// Run an ad-hoc body as a transaction on behalf of `owner`
    pub fn execute<F>(&mut self, label: &str, owner: NodeId, body: F) -> Invocation
    where
        F: FnOnce(&mut Txn<'_>) -> OrchidResult<()>,
    {
        Invocation::execute(&mut self.tree, label, owner, body)
    }

    pub fn apply(&mut self, invocation: &Invocation) -> OrchidResult<()> {
        invocation.apply(&mut self.tree)
    }

    pub fn revert(&mut self, invocation: &Invocation) -> OrchidResult<()> {
        invocation.revert(&mut self.tree)
    }

    /// Fire one edge of `clock` with the given rules
    ///
    /// Every rule runs against pre-edge state; the survivors are then
    /// applied together and the clock advances. A write conflict between
    /// survivors leaves the tree at its pre-edge state.
    pub fn fire_clock(&mut self, clock: ClockId, selected: &[RuleId]) -> OrchidResult<EdgeReport> {
        let (path, time_ps) = {
            let c = self.clocks.get(clock)?;
            if c.is_absorbed() {
                return Err(OrchidError::InvalidConfig(format!(
                    "clock {} is driven by another clock",
                    c.path()
                )));
            }
            if c.period_ps().is_none() {
                return Err(OrchidError::ClockNotScheduled(c.path()));
            }
            (c.path(), c.next_fire_ps())
        };

        let mut applied = Vec::new();
        let mut guarded = 0;
        for &rule in selected {
            let invocation = self.invoke(rule);
            match invocation.outcome() {
                Outcome::Applied => {
                    invocation.revert(&mut self.tree)?;
                    applied.push(invocation);
                }
                Outcome::Guarded => guarded += 1,
                Outcome::Failed(e) => return Err(e.clone()),
            }
        }
        for (done, invocation) in applied.iter().enumerate() {
            if let Err(e) = invocation.apply(&mut self.tree) {
                for undo in applied[..done].iter().rev() {
                    undo.revert(&mut self.tree)?;
                }
                return Err(e);
            }
        }
        self.clocks.get_mut(clock)?.advance()?;

        debug!(clock = %path, time_ps, fired = applied.len(), guarded, "clock edge");
        Ok(EdgeReport { clock, time_ps, applied, guarded })
    }

    pub fn port(&self, path: &str) -> OrchidResult<PortId> {
        self.tree.lookup_port(path)
    }

    /// Harness-side append to a port
    pub fn push(&mut self, port: PortId, value: impl Into<Value>) -> OrchidResult<()> {
        self.tree.push(port, value.into())
    }

    pub fn close_ports(&mut self) {
        self.tree.close_ports();
    }

    pub fn reopen_ports(&mut self) {
        self.tree.reopen_ports();
    }

    pub fn ports_open(&self) -> bool {
        self.tree.ports_open()
    }

    pub fn unmatched_outputs(&self) -> usize {
        self.tree.unmatched_outputs()
    }

    pub fn pending_stimulus(&self) -> usize {
        self.tree.pending_stimulus()
    }
}

/// Describes a model ahead of time, then freezes it
pub struct ModelBuilder {
    tree: TreeBuilder,
    handlers: Vec<Handler>,
    clocks: Vec<ClockDecl>,
}

impl ModelBuilder {
    pub fn new(root_name: &str) -> Self {
        ModelBuilder {
            tree: TreeBuilder::new(root_name),
            handlers: Vec::new(),
            clocks: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Hierarchy and cell declarations
    pub fn tree(&mut self) -> &mut TreeBuilder {
        &mut self.tree
    }

    fn owner_path(&self, owner: NodeId) -> OrchidResult<String> {
        if !self.tree.has_node(owner) {
            return Err(OrchidError::UnknownName(owner.to_string()));
        }
        Ok(self.tree.node_path(owner).to_string())
    }

    fn add_handler<F>(
        &mut self,
        owner: NodeId,
        name: &str,
        params: Vec<ParamDecl>,
        body: F,
        role: HandlerRole,
    ) -> OrchidResult<HandlerId>
    where
        F: Fn(&mut Txn<'_>, &RuleArgs) -> OrchidResult<()> + 'static,
    {
        let owner_path = self.owner_path(owner)?;
        for param in &params {
            check_kind(&param.name, &param.kind)?;
        }
        if self.handlers.iter().any(|h| h.owner == owner && h.name == name) {
            return Err(OrchidError::DuplicateName(format!("{}.{}", owner_path, name)));
        }
        let id = HandlerId::new(self.handlers.len());
        self.handlers.push(Handler {
            id,
            name: name.to_string(),
            owner,
            owner_path,
            params,
            body: Rc::new(body),
            role,
        });
        Ok(id)
    }

    /// Declare an atomic rule handler
    pub fn rule<F>(&mut self, owner: NodeId, name: &str, params: Vec<ParamDecl>, body: F) -> OrchidResult<HandlerId>
    where
        F: Fn(&mut Txn<'_>, &RuleArgs) -> OrchidResult<()> + 'static,
    {
        self.add_handler(owner, name, params, body, HandlerRole::Atomic)
    }

    /// Declare a handler fired only by clocks
    pub fn clocked<F>(&mut self, owner: NodeId, name: &str, params: Vec<ParamDecl>, body: F) -> OrchidResult<HandlerId>
    where
        F: Fn(&mut Txn<'_>, &RuleArgs) -> OrchidResult<()> + 'static,
    {
        self.add_handler(owner, name, params, body, HandlerRole::Clocked)
    }

    /// Declare a clock; nested clocks must be declared first
    pub fn clock(&mut self, owner: NodeId, name: &str, clients: Vec<ClockClient>) -> OrchidResult<ClockId> {
        let owner_path = self.owner_path(owner)?;
        if self.clocks.iter().any(|c| c.owner == owner && c.name == name) {
            return Err(OrchidError::DuplicateName(format!("{}.{}", owner_path, name)));
        }
        for client in &clients {
            let known = match *client {
                ClockClient::Handler(h) => h.index() < self.handlers.len(),
                ClockClient::Clock(c) => c.index() < self.clocks.len(),
            };
            if !known {
                return Err(OrchidError::UnknownName(format!("{:?} in clock {}.{}", client, owner_path, name)));
            }
        }
        let id = ClockId::new(self.clocks.len());
        self.clocks.push(ClockDecl {
            name: name.to_string(),
            owner,
            owner_path,
            clients,
        });
        Ok(id)
    }

    pub fn build(self) -> OrchidResult<Model> {
        let tree = self.tree.freeze();
        let rules = RuleSet::build(&self.handlers)?;
        let clocks = ClockSet::elaborate(self.clocks, |h| rules.rules_of(h))?;
        debug!(
            cells = tree.cell_count(),
            rules = rules.len(),
            clocks = clocks.len(),
            "model built"
        );
        Ok(Model {
            tree,
            handlers: self.handlers,
            rules,
            clocks,
        })
    }
}
