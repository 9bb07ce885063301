//! Co-simulation sources
//!
//! A co-simulation produces the external data a reference model is checked
//! against. Each step pushes zero or more values onto the reference model's
//! ports through a [`PortFeed`].

use std::collections::VecDeque;

use tracing::debug;

use orchid_core::{OrchidResult, PortId, Value};
use orchid_runtime::{ClockedSimulator, Model};

/// Harness-side write access to a reference model's ports
pub struct PortFeed<'m> {
    model: &'m mut Model,
    pushed: usize,
}

impl<'m> PortFeed<'m> {
    pub fn new(model: &'m mut Model) -> Self {
        PortFeed { model, pushed: 0 }
    }

    pub fn push(&mut self, port: PortId, value: impl Into<Value>) -> OrchidResult<()> {
        self.model.push(port, value)?;
        self.pushed += 1;
        Ok(())
    }

    /// Push by absolute port path, e.g. `top.req`
    pub fn push_path(&mut self, path: &str, value: impl Into<Value>) -> OrchidResult<()> {
        let port = self.model.port(path)?;
        self.push(port, value)
    }

    /// Reference model being fed
    pub fn model(&self) -> &Model {
        self.model
    }

    /// Values pushed through this feed
    pub fn pushed(&self) -> usize {
        self.pushed
    }
}

/// A source of external stimulus and observed outputs
pub trait CoSimulation {
    /// Produce up to `steps` steps of data
    ///
    /// Returns the number of steps actually produced; 0 means the source is
    /// exhausted.
    fn advance(&mut self, feed: &mut PortFeed<'_>, steps: u64) -> OrchidResult<u64>;
}

/// Scripted trace: each step pushes a fixed list of `(port path, value)` pairs
#[derive(Clone, Debug, Default)]
pub struct TraceReplay {
    steps: VecDeque<Vec<(String, Value)>>,
}

impl TraceReplay {
    pub fn new() -> Self {
        TraceReplay::default()
    }

    /// Append a step
    pub fn step<V: Into<Value>>(mut self, pushes: Vec<(&str, V)>) -> Self {
        self.push_step(pushes);
        self
    }

    pub fn push_step<V: Into<Value>>(&mut self, pushes: Vec<(&str, V)>) {
        self.steps
            .push_back(pushes.into_iter().map(|(p, v)| (p.to_string(), v.into())).collect());
    }

    /// Steps not yet fed
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl CoSimulation for TraceReplay {
    fn advance(&mut self, feed: &mut PortFeed<'_>, steps: u64) -> OrchidResult<u64> {
        let mut produced = 0;
        while produced < steps {
            let Some(step) = self.steps.pop_front() else {
                break;
            };
            for (path, value) in step {
                feed.push_path(&path, value)?;
            }
            produced += 1;
        }
        Ok(produced)
    }
}

/// Runs an implementation model under a [`ClockedSimulator`]
///
/// One step is one cycle of the fastest driven clock. After each step the
/// sampler inspects the implementation and pushes what it saw onto the
/// reference model's ports.
pub struct ClockedCoSim<F> {
    sim: ClockedSimulator,
    sampler: F,
    cycles: u64,
    limit: Option<u64>,
}

impl<F> ClockedCoSim<F>
where
    F: FnMut(&Model, &mut PortFeed<'_>) -> OrchidResult<()>,
{
    pub fn new(sim: ClockedSimulator, sampler: F) -> Self {
        ClockedCoSim {
            sim,
            sampler,
            cycles: 0,
            limit: None,
        }
    }

    /// Stop producing after `cycles` cycles
    pub fn with_limit(mut self, cycles: u64) -> Self {
        self.limit = Some(cycles);
        self
    }

    pub fn simulator(&self) -> &ClockedSimulator {
        &self.sim
    }

    pub fn simulator_mut(&mut self) -> &mut ClockedSimulator {
        &mut self.sim
    }

    /// Cycles produced so far
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Fire edges until the fastest clock has fired once
    fn cycle(&mut self) -> OrchidResult<bool> {
        let fastest = self.sim.fastest();
        while let Some(edge) = self.sim.step(u64::MAX)? {
            if edge.clock == fastest {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<F> CoSimulation for ClockedCoSim<F>
where
    F: FnMut(&Model, &mut PortFeed<'_>) -> OrchidResult<()>,
{
    fn advance(&mut self, feed: &mut PortFeed<'_>, steps: u64) -> OrchidResult<u64> {
        let mut produced = 0;
        while produced < steps {
            if self.limit.is_some_and(|limit| self.cycles >= limit) {
                break;
            }
            if !self.cycle()? {
                break;
            }
            (self.sampler)(self.sim.model(), feed)?;
            self.cycles += 1;
            produced += 1;
        }
        debug!(produced, cycles = self.cycles, time_ps = self.sim.time_ps(), "co-simulation advanced");
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchid_core::LeafKind;
    use orchid_runtime::{ClockInput, ClockedConfig, ModelBuilder};
    use orchid_state::PortDirection;
    use orchid_time::ClockClient;

    fn sink() -> Model {
        let mut b = ModelBuilder::new("ref");
        let root = b.root();
        b.tree()
            .add_port(root, "seen", PortDirection::Observed, LeafKind::bounded(100))
            .unwrap();
        b.build().unwrap()
    }

    fn counter() -> Model {
        let mut b = ModelBuilder::new("dut");
        let root = b.root();
        b.tree()
            .add_cell(root, "count", LeafKind::modulo(100), Some(Value::Int(0)))
            .unwrap();
        let inc = b
            .clocked(root, "inc", vec![], |t, _| {
                let c = t.cell("count")?;
                let v = t.read_int(c)?;
                t.write(c, v + 1)
            })
            .unwrap();
        b.clock(root, "clk", vec![ClockClient::Handler(inc)]).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_trace_replay_feeds_in_order() {
        let mut model = sink();
        let mut trace = TraceReplay::new()
            .step(vec![("ref.seen", 1)])
            .step(vec![("ref.seen", 2), ("ref.seen", 3)])
            .step(Vec::<(&str, i64)>::new());
        let mut feed = PortFeed::new(&mut model);
        assert_eq!(trace.advance(&mut feed, 2).unwrap(), 2);
        assert_eq!(feed.pushed(), 3);
        assert_eq!(trace.advance(&mut feed, 5).unwrap(), 1);
        assert_eq!(trace.advance(&mut feed, 5).unwrap(), 0);
        let port = model.port("ref.seen").unwrap();
        assert_eq!(
            model.tree().port(port).entries(),
            &[Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert_eq!(model.unmatched_outputs(), 3);
    }

    #[test]
    fn test_trace_replay_rejects_bad_value() {
        let mut model = sink();
        let mut trace = TraceReplay::new().step(vec![("ref.seen", 500)]);
        let mut feed = PortFeed::new(&mut model);
        assert!(trace.advance(&mut feed, 1).is_err());
    }

    #[test]
    fn test_clocked_cosim_samples_each_cycle() {
        let sim = ClockedSimulator::with_config(
            counter(),
            &[ClockInput::period_ps(1000)],
            ClockedConfig::seeded(1),
        )
        .unwrap();
        let mut cosim = ClockedCoSim::new(sim, |dut: &Model, feed: &mut PortFeed<'_>| {
            let c = dut.tree().lookup_cell("dut.count")?;
            let v = dut.tree().read(c)?.clone();
            feed.push_path("ref.seen", v)
        })
        .with_limit(4);

        let mut model = sink();
        let mut feed = PortFeed::new(&mut model);
        assert_eq!(cosim.advance(&mut feed, 3).unwrap(), 3);
        assert_eq!(cosim.advance(&mut feed, 3).unwrap(), 1);
        assert_eq!(cosim.advance(&mut feed, 3).unwrap(), 0);
        assert_eq!(cosim.cycles(), 4);
        assert_eq!(cosim.simulator().time_ps(), 3000);

        let port = model.port("ref.seen").unwrap();
        let seen: Vec<i64> = model
            .tree()
            .port(port)
            .entries()
            .iter()
            .filter_map(Value::as_int)
            .collect();
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }
}
