//! Clock composition and time-ordered selection

use orchid_core::{ClockId, HandlerId, OrchidError, OrchidResult, RuleId};

use crate::{Clock, ClockClient, ClockDecl, RuleGroup};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Fresh,
    Active,
    Done,
}

/// All clocks of a model, in declaration order
#[derive(Clone, Debug, Default)]
pub struct ClockSet {
    clocks: Vec<Clock>,
}

impl ClockSet {
    /// Flatten nested clocks into their parents and mark them absorbed
    ///
    /// `rules_of` yields the concrete rules of a handler.
    pub fn elaborate<F>(decls: Vec<ClockDecl>, rules_of: F) -> OrchidResult<ClockSet>
    where
        F: Fn(HandlerId) -> Vec<RuleId>,
    {
        let count = decls.len();
        let mut visit = vec![Visit::Fresh; count];
        let mut groups: Vec<Vec<RuleGroup>> = vec![Vec::new(); count];
        let mut absorbed = vec![false; count];

        for id in 0..count {
            flatten(id, &decls, &rules_of, &mut visit, &mut groups, &mut absorbed)?;
        }

        let clocks = decls
            .into_iter()
            .zip(groups)
            .zip(absorbed)
            .enumerate()
            .map(|(i, ((decl, groups), absorbed))| Clock {
                id: ClockId::new(i),
                name: decl.name,
                owner: decl.owner,
                owner_path: decl.owner_path,
                groups,
                period_ps: None,
                phase_ps: 0,
                next_fire_ps: 0,
                events: 0,
                absorbed,
            })
            .collect();
        Ok(ClockSet { clocks })
    }

    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    pub fn get(&self, id: ClockId) -> OrchidResult<&Clock> {
        self.clocks
            .get(id.index())
            .ok_or_else(|| OrchidError::UnknownName(id.to_string()))
    }

    pub fn get_mut(&mut self, id: ClockId) -> OrchidResult<&mut Clock> {
        self.clocks
            .get_mut(id.index())
            .ok_or_else(|| OrchidError::UnknownName(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clock> {
        self.clocks.iter()
    }

    /// Lazy lookup over clocks that can be scheduled on their own
    pub fn query(&self) -> ClockQuery<'_> {
        ClockQuery {
            clocks: &self.clocks,
            name: None,
            within: None,
        }
    }

    /// Clock with the earliest next edge among `among`; ties go to the
    /// earlier declaration
    pub fn next_due(&self, among: &[ClockId]) -> Option<ClockId> {
        among
            .iter()
            .filter_map(|id| self.clocks.get(id.index()))
            .filter(|c| c.is_scheduled())
            .min_by_key(|c| (c.next_fire_ps, c.id))
            .map(|c| c.id)
    }
}

fn flatten<F>(
    id: usize,
    decls: &[ClockDecl],
    rules_of: &F,
    visit: &mut [Visit],
    groups: &mut [Vec<RuleGroup>],
    absorbed: &mut [bool],
) -> OrchidResult<()>
where
    F: Fn(HandlerId) -> Vec<RuleId>,
{
    match visit[id] {
        Visit::Done => return Ok(()),
        Visit::Active => {
            let decl = &decls[id];
            return Err(OrchidError::ClockCycle(format!("{}.{}", decl.owner_path, decl.name)));
        }
        Visit::Fresh => {}
    }
    visit[id] = Visit::Active;

    let mut collected: Vec<RuleGroup> = Vec::new();
    for client in &decls[id].clients {
        match *client {
            ClockClient::Handler(handler) => push_group(
                &mut collected,
                RuleGroup { handler, rules: rules_of(handler) },
            ),
            ClockClient::Clock(nested) => {
                let n = nested.index();
                if n >= decls.len() {
                    return Err(OrchidError::UnknownName(nested.to_string()));
                }
                flatten(n, decls, rules_of, visit, groups, absorbed)?;
                absorbed[n] = true;
                for group in groups[n].clone() {
                    push_group(&mut collected, group);
                }
            }
        }
    }

    groups[id] = collected;
    visit[id] = Visit::Done;
    Ok(())
}

fn push_group(groups: &mut Vec<RuleGroup>, group: RuleGroup) {
    if !groups.iter().any(|g| g.handler == group.handler) {
        groups.push(group);
    }
}

/// Restartable clock lookup by name and owner subtree
#[derive(Clone, Debug)]
pub struct ClockQuery<'a> {
    clocks: &'a [Clock],
    name: Option<&'a str>,
    within: Option<&'a str>,
}

impl<'a> ClockQuery<'a> {
    pub fn named(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    /// Clocks owned by the node at `path` or any node below it
    pub fn within(mut self, path: &'a str) -> Self {
        self.within = Some(path);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Clock> + '_ {
        self.clocks.iter().filter(move |c| self.matches(c))
    }

    pub fn ids(&self) -> Vec<ClockId> {
        self.iter().map(|c| c.id).collect()
    }

    pub fn first(&self) -> Option<&'a Clock> {
        self.iter().next()
    }

    fn matches(&self, clock: &Clock) -> bool {
        if clock.absorbed {
            return false;
        }
        if let Some(name) = self.name {
            if clock.name != name {
                return false;
            }
        }
        match self.within {
            Some(path) => match clock.owner_path.strip_prefix(path) {
                Some(rest) => rest.is_empty() || rest.starts_with('.'),
                None => false,
            },
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchid_core::NodeId;

    fn decl(name: &str, owner_path: &str, clients: Vec<ClockClient>) -> ClockDecl {
        ClockDecl {
            name: name.into(),
            owner: NodeId::ROOT,
            owner_path: owner_path.into(),
            clients,
        }
    }

    fn two_rules_each(h: HandlerId) -> Vec<RuleId> {
        vec![RuleId::new(h.index() * 2), RuleId::new(h.index() * 2 + 1)]
    }

    #[test]
    fn test_nested_clock_is_absorbed() {
        let decls = vec![
            decl("clk_a", "top.sub", vec![ClockClient::Handler(HandlerId::new(1))]),
            decl("clk_b", "top.sub", vec![ClockClient::Handler(HandlerId::new(2))]),
            decl(
                "clk",
                "top",
                vec![
                    ClockClient::Handler(HandlerId::new(0)),
                    ClockClient::Clock(ClockId::new(0)),
                ],
            ),
        ];
        let set = ClockSet::elaborate(decls, two_rules_each).unwrap();
        let top = set.get(ClockId::new(2)).unwrap();
        let handlers: Vec<_> = top.groups().iter().map(|g| g.handler).collect();
        assert_eq!(handlers, vec![HandlerId::new(0), HandlerId::new(1)]);
        assert_eq!(top.rules().count(), 4);
        assert!(set.get(ClockId::new(0)).unwrap().is_absorbed());

        let in_sub = set.query().within("top.sub").ids();
        assert_eq!(in_sub, vec![ClockId::new(1)]);
        assert_eq!(set.query().within("top").ids(), vec![ClockId::new(1), ClockId::new(2)]);
        assert!(set.query().within("top.su").ids().is_empty());
        assert_eq!(set.query().named("clk").first().map(|c| c.id()), Some(ClockId::new(2)));
    }

    #[test]
    fn test_clock_cycle_detected() {
        let decls = vec![
            decl("a", "top", vec![ClockClient::Clock(ClockId::new(1))]),
            decl("b", "top", vec![ClockClient::Clock(ClockId::new(0))]),
        ];
        assert!(matches!(
            ClockSet::elaborate(decls, two_rules_each),
            Err(OrchidError::ClockCycle(_))
        ));
    }

    #[test]
    fn test_unknown_nested_clock() {
        let decls = vec![decl("a", "top", vec![ClockClient::Clock(ClockId::new(5))])];
        assert!(ClockSet::elaborate(decls, two_rules_each).is_err());
    }

    #[test]
    fn test_absorbed_clock_refuses_period() {
        let decls = vec![
            decl("inner", "top", vec![]),
            decl("outer", "top", vec![ClockClient::Clock(ClockId::new(0))]),
        ];
        let mut set = ClockSet::elaborate(decls, two_rules_each).unwrap();
        assert!(set.get_mut(ClockId::new(0)).unwrap().set_period(10, 0).is_err());
    }

    #[test]
    fn test_next_due_breaks_ties_by_declaration() {
        let decls = vec![decl("a", "top", vec![]), decl("b", "top", vec![]), decl("c", "top", vec![])];
        let mut set = ClockSet::elaborate(decls, two_rules_each).unwrap();
        let all = [ClockId::new(0), ClockId::new(1), ClockId::new(2)];
        assert_eq!(set.next_due(&all), None);

        set.get_mut(ClockId::new(1)).unwrap().set_period(100, 0).unwrap();
        set.get_mut(ClockId::new(2)).unwrap().set_period(50, 0).unwrap();
        assert_eq!(set.next_due(&all), Some(ClockId::new(1)));
        set.get_mut(ClockId::new(1)).unwrap().advance().unwrap();
        assert_eq!(set.next_due(&all), Some(ClockId::new(2)));
        set.get_mut(ClockId::new(2)).unwrap().advance().unwrap();
        assert_eq!(set.next_due(&all), Some(ClockId::new(2)));
        set.get_mut(ClockId::new(2)).unwrap().advance().unwrap();
        // both at 100 now
        assert_eq!(set.next_due(&all), Some(ClockId::new(1)));
    }
}
