//! Handlers, rules and rule-set construction
//!
//! A handler declares parameters with finite domains. Building the rule set
//! materializes one [`Rule`] per point of the Cartesian product of those
//! domains, with the first parameter varying slowest.

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use orchid_core::{HandlerId, LeafKind, NodeId, OrchidError, OrchidResult, RuleId, Value};
use orchid_state::Txn;

/// Rule body: reads and writes through the transaction handle
pub type HandlerFn = Rc<dyn Fn(&mut Txn<'_>, &RuleArgs) -> OrchidResult<()>>;

/// Declared parameter of a handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub kind: LeafKind,
}

impl ParamDecl {
    pub fn new(name: &str, kind: LeafKind) -> Self {
        ParamDecl { name: name.to_string(), kind }
    }
}

/// Whether a handler takes part in atomic scheduling
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerRole {
    /// Member of the atomic rule pool
    Atomic,
    /// Fired only by clocks
    Clocked,
}

pub struct Handler {
    pub(crate) id: HandlerId,
    pub(crate) name: String,
    pub(crate) owner: NodeId,
    pub(crate) owner_path: String,
    pub(crate) params: Vec<ParamDecl>,
    pub(crate) body: HandlerFn,
    pub(crate) role: HandlerRole,
}

impl Handler {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn path(&self) -> String {
        format!("{}.{}", self.owner_path, self.name)
    }

    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    pub fn role(&self) -> HandlerRole {
        self.role
    }

    pub(crate) fn body(&self) -> &HandlerFn {
        &self.body
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("path", &self.path())
            .field("params", &self.params)
            .field("role", &self.role)
            .finish()
    }
}

/// Concrete parameter assignment of a rule
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RuleArgs {
    values: Vec<(Rc<str>, Value)>,
}

impl RuleArgs {
    pub fn new() -> Self {
        RuleArgs::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.push((name.into(), value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (&**n, v))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| &**n == name).map(|(_, v)| v)
    }

    pub fn value(&self, name: &str) -> OrchidResult<&Value> {
        self.get(name)
            .ok_or_else(|| OrchidError::UnknownName(format!("parameter {}", name)))
    }

    pub fn int(&self, name: &str) -> OrchidResult<i64> {
        let value = self.value(name)?;
        value
            .as_int()
            .ok_or_else(|| OrchidError::InvalidParameter(format!("{} = {} is not an integer", name, value)))
    }

    pub fn bool(&self, name: &str) -> OrchidResult<bool> {
        let value = self.value(name)?;
        value
            .as_bool()
            .ok_or_else(|| OrchidError::InvalidParameter(format!("{} = {} is not a boolean", name, value)))
    }

    pub fn enum_index(&self, name: &str) -> OrchidResult<u32> {
        let value = self.value(name)?;
        value
            .as_enum()
            .ok_or_else(|| OrchidError::InvalidParameter(format!("{} = {} is not an enumeration", name, value)))
    }

    /// True when every listed parameter has the listed value
    pub fn matches(&self, partial: &[(&str, Value)]) -> bool {
        partial.iter().all(|(name, value)| self.get(name) == Some(value))
    }
}

impl fmt::Display for RuleArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

/// One concrete invocable rule
#[derive(Clone, Debug)]
pub struct Rule {
    pub(crate) id: RuleId,
    pub(crate) handler: HandlerId,
    pub(crate) handler_name: Rc<str>,
    pub(crate) owner: NodeId,
    pub(crate) label: String,
    pub(crate) args: RuleArgs,
    pub(crate) role: HandlerRole,
}

impl Rule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn handler(&self) -> HandlerId {
        self.handler
    }

    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn args(&self) -> &RuleArgs {
        &self.args
    }

    pub fn role(&self) -> HandlerRole {
        self.role
    }

    /// Rendered as `top.sub.handler(a=1, up=true)`
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Every rule of a model
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    by_handler: Vec<Range<usize>>,
    atomic: Vec<RuleId>,
}

impl RuleSet {
    pub fn build(handlers: &[Handler]) -> OrchidResult<RuleSet> {
        let mut set = RuleSet::default();
        for handler in handlers {
            let domains = handler
                .params
                .iter()
                .map(|p| {
                    p.kind.domain().ok_or_else(|| OrchidError::UnboundedDomain {
                        handler: handler.path(),
                        param: p.name.clone(),
                    })
                })
                .collect::<OrchidResult<Vec<_>>>()?;

            let start = set.rules.len();
            let name: Rc<str> = handler.name.as_str().into();
            for point in cartesian(&domains) {
                let args = RuleArgs {
                    values: handler
                        .params
                        .iter()
                        .map(|p| Rc::from(p.name.as_str()))
                        .zip(point)
                        .collect(),
                };
                let id = RuleId::new(set.rules.len());
                if handler.role == HandlerRole::Atomic {
                    set.atomic.push(id);
                }
                set.rules.push(Rule {
                    id,
                    handler: handler.id,
                    handler_name: name.clone(),
                    owner: handler.owner,
                    label: format!("{}({})", handler.path(), args),
                    args,
                    role: handler.role,
                });
            }
            set.by_handler.push(start..set.rules.len());
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.rules.get(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Members of the atomic rule pool, in construction order
    pub fn atomic(&self) -> &[RuleId] {
        &self.atomic
    }

    pub fn for_handler(&self, handler: HandlerId) -> &[Rule] {
        match self.by_handler.get(handler.index()) {
            Some(range) => &self.rules[range.clone()],
            None => &[],
        }
    }

    pub fn rules_of(&self, handler: HandlerId) -> Vec<RuleId> {
        self.for_handler(handler).iter().map(|r| r.id).collect()
    }

    pub fn query(&self) -> RuleQuery<'_> {
        RuleQuery {
            rules: &self.rules,
            owner: None,
            handler: None,
            params: Vec::new(),
            clocked: false,
        }
    }
}

/// Cartesian product of `domains`, first domain varying slowest
pub fn cartesian(domains: &[Vec<Value>]) -> Vec<Vec<Value>> {
    domains.iter().fold(vec![Vec::new()], |acc, domain| {
        acc.iter()
            .flat_map(|prefix| {
                domain.iter().map(move |v| {
                    let mut point = prefix.clone();
                    point.push(v.clone());
                    point
                })
            })
            .collect()
    })
}

/// Lazy, restartable rule lookup
///
/// Clock-only rules are skipped unless `including_clocked` is set.
#[derive(Clone, Debug)]
pub struct RuleQuery<'a> {
    rules: &'a [Rule],
    owner: Option<NodeId>,
    handler: Option<&'a str>,
    params: Vec<(&'a str, Value)>,
    clocked: bool,
}

impl<'a> RuleQuery<'a> {
    pub fn owner(mut self, owner: NodeId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn handler(mut self, name: &'a str) -> Self {
        self.handler = Some(name);
        self
    }

    pub fn param(mut self, name: &'a str, value: impl Into<Value>) -> Self {
        self.params.push((name, value.into()));
        self
    }

    pub fn including_clocked(mut self) -> Self {
        self.clocked = true;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Rule> + '_ {
        self.rules.iter().filter(move |r| self.matches(r))
    }

    pub fn ids(&self) -> Vec<RuleId> {
        self.iter().map(|r| r.id).collect()
    }

    pub fn first(&self) -> Option<&'a Rule> {
        self.iter().next()
    }

    pub fn count(&self) -> usize {
        self.iter().count()
    }

    fn matches(&self, rule: &Rule) -> bool {
        (self.clocked || rule.role == HandlerRole::Atomic)
            && self.owner.map_or(true, |o| o == rule.owner)
            && self.handler.map_or(true, |h| h == &*rule.handler_name)
            && rule.args.matches(&self.params)
    }
}
