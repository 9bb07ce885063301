//! Clocked simulator
//!
//! Drives one or more clocks in virtual time. The clock with the earliest
//! next edge fires first; on each edge one parameterization per handler is
//! drawn at random and all of them see pre-edge state.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;

use orchid_core::{ClockId, OrchidError, OrchidResult, RuleId};
use orchid_time::period_from_ghz;

use crate::{EdgeReport, Model};

/// How fast a clock runs
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockRate {
    PeriodPs(u64),
    FrequencyGhz(f64),
}

/// Selects clocks by name and/or owner subtree and sets their timing
#[derive(Clone, Debug, PartialEq)]
pub struct ClockInput {
    pub name: Option<String>,
    /// Path of the owning node; clocks below it match as well
    pub within: Option<String>,
    pub rate: ClockRate,
    pub phase_ps: u64,
}

impl ClockInput {
    pub fn period_ps(period_ps: u64) -> Self {
        ClockInput {
            name: None,
            within: None,
            rate: ClockRate::PeriodPs(period_ps),
            phase_ps: 0,
        }
    }

    pub fn frequency_ghz(ghz: f64) -> Self {
        ClockInput {
            name: None,
            within: None,
            rate: ClockRate::FrequencyGhz(ghz),
            phase_ps: 0,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn within(mut self, path: &str) -> Self {
        self.within = Some(path.to_string());
        self
    }

    pub fn phase(mut self, phase_ps: u64) -> Self {
        self.phase_ps = phase_ps;
        self
    }

    fn period(&self) -> OrchidResult<u64> {
        match self.rate {
            ClockRate::PeriodPs(p) => Ok(p),
            ClockRate::FrequencyGhz(ghz) => period_from_ghz(ghz),
        }
    }
}

/// How long to run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunLength {
    /// Picoseconds from the current time
    Duration(u64),
    /// Cycles of the first driven clock
    Cycles(u64),
    /// Cycles of the fastest driven clock
    FastestCycles(u64),
}

#[derive(Clone, Debug)]
pub struct ClockedConfig {
    pub seed: Option<u64>,
    pub show_output: bool,
    pub output_headers: bool,
}

impl Default for ClockedConfig {
    fn default() -> Self {
        ClockedConfig {
            seed: None,
            show_output: true,
            output_headers: true,
        }
    }
}

impl ClockedConfig {
    pub fn seeded(seed: u64) -> Self {
        ClockedConfig {
            seed: Some(seed),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClockedReport {
    pub edges: u64,
    pub applied: u64,
    pub guarded: u64,
    pub end_time_ps: u64,
}

pub struct ClockedSimulator {
    model: Model,
    driven: Vec<ClockId>,
    fastest: ClockId,
    rng: StdRng,
    seed: u64,
    config: ClockedConfig,
    time_ps: u64,
    edges: u64,
    transcript: Vec<String>,
}

impl ClockedSimulator {
    pub fn new(model: Model, inputs: &[ClockInput]) -> OrchidResult<Self> {
        Self::with_config(model, inputs, ClockedConfig::default())
    }

    pub fn with_config(mut model: Model, inputs: &[ClockInput], config: ClockedConfig) -> OrchidResult<Self> {
        let mut driven: Vec<ClockId> = Vec::new();
        let mut fastest: Option<(u64, ClockId)> = None;
        for input in inputs {
            let period = input.period()?;
            let mut query = model.find_clock();
            if let Some(name) = &input.name {
                query = query.named(name);
            }
            if let Some(path) = &input.within {
                query = query.within(path);
            }
            let ids = query.ids();
            if ids.is_empty() {
                return Err(OrchidError::UnknownName(format!(
                    "no clock matches {:?} within {:?}",
                    input.name, input.within
                )));
            }
            for id in ids {
                model.clocks_mut().get_mut(id)?.set_period(period, input.phase_ps)?;
                if !driven.contains(&id) {
                    driven.push(id);
                }
                if fastest.map_or(true, |(p, _)| period < p) {
                    fastest = Some((period, id));
                }
            }
        }
        let Some((_, fastest)) = fastest else {
            return Err(OrchidError::InvalidConfig("no clock inputs".into()));
        };
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(ClockedSimulator {
            model,
            driven,
            fastest,
            rng: StdRng::seed_from_u64(seed),
            seed,
            config,
            time_ps: 0,
            edges: 0,
            transcript: Vec::new(),
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Time of the last fired edge
    pub fn time_ps(&self) -> u64 {
        self.time_ps
    }

    pub fn edges(&self) -> u64 {
        self.edges
    }

    pub fn driven(&self) -> &[ClockId] {
        &self.driven
    }

    /// Driven clock with the shortest period
    pub fn fastest(&self) -> ClockId {
        self.fastest
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    fn period_of(&self, clock: ClockId) -> OrchidResult<u64> {
        let c = self.model.clocks().get(clock)?;
        c.period_ps().ok_or_else(|| OrchidError::ClockNotScheduled(c.path()))
    }

    /// Absolute end time for a run starting now
    ///
    /// Cycle counts run half a period past the last edge so the final edge
    /// is included.
    pub fn end_time(&self, length: RunLength) -> OrchidResult<u64> {
        let duration = match length {
            RunLength::Duration(ps) => ps,
            RunLength::Cycles(n) => half_past(n, self.period_of(self.driven[0])?),
            RunLength::FastestCycles(n) => half_past(n, self.period_of(self.fastest)?),
        };
        Ok(self.time_ps.saturating_add(duration))
    }

    pub fn run(&mut self, length: RunLength) -> OrchidResult<ClockedReport> {
        let end = self.end_time(length)?;
        self.run_until(end)
    }

    /// Fire every edge strictly before `end_ps`
    pub fn run_until(&mut self, end_ps: u64) -> OrchidResult<ClockedReport> {
        let mut report = ClockedReport::default();
        while let Some(edge) = self.step(end_ps)? {
            report.edges += 1;
            report.applied += edge.applied.len() as u64;
            report.guarded += edge.guarded as u64;
        }
        report.end_time_ps = end_ps;
        info!(
            seed = self.seed,
            edges = report.edges,
            applied = report.applied,
            time_ps = self.time_ps,
            "clocked run finished"
        );
        Ok(report)
    }

    /// Fire the next due edge if it falls before `end_ps`
    pub fn step(&mut self, end_ps: u64) -> OrchidResult<Option<EdgeReport>> {
        let Some(clock) = self.model.clocks().next_due(&self.driven) else {
            return Ok(None);
        };
        let next = self.model.clocks().get(clock)?.next_fire_ps();
        if next >= end_ps {
            return Ok(None);
        }
        self.time_ps = next;
        let selected = self.select_rules(clock)?;
        let edge = self.model.fire_clock(clock, &selected)?;
        self.edges += 1;
        if self.config.show_output {
            for invocation in &edge.applied {
                for line in invocation.flush_output(self.config.output_headers) {
                    info!(target: "orchid::output", time_ps = edge.time_ps, "{}", line);
                    self.transcript.push(line);
                }
            }
        }
        Ok(Some(edge))
    }

    /// One rule per handler on the clock's sensitivity list
    fn select_rules(&mut self, clock: ClockId) -> OrchidResult<Vec<RuleId>> {
        let c = self.model.clocks().get(clock)?;
        Ok(c.groups()
            .iter()
            .filter_map(|group| group.rules.choose(&mut self.rng).copied())
            .collect())
    }
}

fn half_past(cycles: u64, period: u64) -> u64 {
    cycles.saturating_mul(period).saturating_add(period / 2)
}
