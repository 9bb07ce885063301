//! Virtual clocks

use orchid_core::{ClockId, HandlerId, NodeId, OrchidError, OrchidResult, RuleId};

/// Rules of one handler; at most one of them runs per edge
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleGroup {
    pub handler: HandlerId,
    pub rules: Vec<RuleId>,
}

/// Something a clock triggers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClockClient {
    Handler(HandlerId),
    /// A nested clock; its rules fire on this clock's edges instead
    Clock(ClockId),
}

/// Clock as declared by the model author
#[derive(Clone, Debug)]
pub struct ClockDecl {
    pub name: String,
    pub owner: NodeId,
    pub owner_path: String,
    pub clients: Vec<ClockClient>,
}

/// An elaborated clock
#[derive(Clone, Debug)]
pub struct Clock {
    pub(crate) id: ClockId,
    pub(crate) name: String,
    pub(crate) owner: NodeId,
    pub(crate) owner_path: String,
    pub(crate) groups: Vec<RuleGroup>,
    pub(crate) period_ps: Option<u64>,
    pub(crate) phase_ps: u64,
    pub(crate) next_fire_ps: u64,
    pub(crate) events: u64,
    pub(crate) absorbed: bool,
}

impl Clock {
    pub fn id(&self) -> ClockId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn owner_path(&self) -> &str {
        &self.owner_path
    }

    pub fn path(&self) -> String {
        format!("{}.{}", self.owner_path, self.name)
    }

    /// Sensitivity list grouped by handler, nested clocks included
    pub fn groups(&self) -> &[RuleGroup] {
        &self.groups
    }

    pub fn rules(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.groups.iter().flat_map(|g| g.rules.iter().copied())
    }

    pub fn period_ps(&self) -> Option<u64> {
        self.period_ps
    }

    pub fn phase_ps(&self) -> u64 {
        self.phase_ps
    }

    pub fn next_fire_ps(&self) -> u64 {
        self.next_fire_ps
    }

    /// Edges fired so far
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Driven by another clock, never scheduled on its own
    pub fn is_absorbed(&self) -> bool {
        self.absorbed
    }

    pub fn is_scheduled(&self) -> bool {
        self.period_ps.is_some() && !self.absorbed
    }

    /// Set period and phase; the phase moves the first edge only while no
    /// edge has fired yet
    pub fn set_period(&mut self, period_ps: u64, phase_ps: u64) -> OrchidResult<()> {
        if period_ps == 0 {
            return Err(OrchidError::InvalidConfig(format!("clock {} needs a nonzero period", self.path())));
        }
        if self.absorbed {
            return Err(OrchidError::InvalidConfig(format!(
                "clock {} is driven by another clock",
                self.path()
            )));
        }
        self.period_ps = Some(period_ps);
        if self.events == 0 {
            self.phase_ps = phase_ps;
            self.next_fire_ps = phase_ps;
        }
        Ok(())
    }

    /// Record one edge; returns its time
    pub fn advance(&mut self) -> OrchidResult<u64> {
        let period = self
            .period_ps
            .ok_or_else(|| OrchidError::ClockNotScheduled(self.path()))?;
        let fired = self.next_fire_ps;
        self.next_fire_ps += period;
        self.events += 1;
        Ok(fired)
    }
}

/// Period in picoseconds for a frequency in GHz, rounded to nearest
pub fn period_from_ghz(ghz: f64) -> OrchidResult<u64> {
    if !(ghz.is_finite() && ghz > 0.0) {
        return Err(OrchidError::InvalidConfig(format!("bad frequency {} GHz", ghz)));
    }
    let period = (1000.0 / ghz).round();
    if period < 1.0 {
        return Err(OrchidError::InvalidConfig(format!("{} GHz is below 1 ps resolution", ghz)));
    }
    Ok(period as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clock() -> Clock {
        Clock {
            id: ClockId::new(0),
            name: "clk".into(),
            owner: NodeId::ROOT,
            owner_path: "top".into(),
            groups: Vec::new(),
            period_ps: None,
            phase_ps: 0,
            next_fire_ps: 0,
            events: 0,
            absorbed: false,
        }
    }

    #[test]
    fn test_unscheduled_clock_cannot_advance() {
        let mut c = clock();
        assert!(matches!(c.advance(), Err(OrchidError::ClockNotScheduled(p)) if p == "top.clk"));
    }

    #[test]
    fn test_advance_by_period() {
        let mut c = clock();
        c.set_period(1000, 250).unwrap();
        assert_eq!(c.advance().unwrap(), 250);
        assert_eq!(c.advance().unwrap(), 1250);
        assert_eq!(c.next_fire_ps(), 2250);
        assert_eq!(c.events(), 2);

        c.set_period(500, 0).unwrap();
        assert_eq!(c.phase_ps(), 250);
        assert_eq!(c.advance().unwrap(), 2250);
        assert_eq!(c.next_fire_ps(), 2750);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(clock().set_period(0, 0).is_err());
    }

    #[test]
    fn test_period_from_ghz() {
        assert_eq!(period_from_ghz(1.0).unwrap(), 1000);
        assert_eq!(period_from_ghz(0.3).unwrap(), 3333);
        assert_eq!(period_from_ghz(3.0).unwrap(), 333);
        assert!(period_from_ghz(0.0).is_err());
        assert!(period_from_ghz(f64::NAN).is_err());
    }

    proptest! {
        #[test]
        fn prop_edges_at_phase_plus_period(period in 1u64..10_000, phase in 0u64..10_000, n in 1u64..200) {
            let mut c = clock();
            c.set_period(period, phase).unwrap();
            let mut last = None;
            for k in 0..n {
                let fired = c.advance().unwrap();
                prop_assert_eq!(fired, phase + k * period);
                prop_assert!(last.map_or(true, |l| fired > l));
                last = Some(fired);
            }
            prop_assert_eq!(c.events(), n);
        }
    }
}
