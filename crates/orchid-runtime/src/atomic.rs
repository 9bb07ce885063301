//! Atomic-rule simulator
//!
//! Each step picks rules at random from a pool until one applies. After a
//! budget of guarded picks it probes every rule once, keeps the ones that
//! apply, and commits one of them at random. If the probe finds nothing the
//! model is deadlocked.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use orchid_core::{OrchidResult, RuleId};
use orchid_state::{Invocation, Outcome};

use crate::Model;

/// Atomic simulator configuration
#[derive(Clone, Debug)]
pub struct AtomicConfig {
    /// RNG seed; a random seed is drawn and recorded when absent
    pub seed: Option<u64>,
    /// Guarded picks before the exhaustive probe; half the pool when absent
    pub guards_before_exhaustive: Option<usize>,
    /// Emit rule output to the log and transcript
    pub show_output: bool,
    /// Prefix output lines with the rule label
    pub output_headers: bool,
}

impl Default for AtomicConfig {
    fn default() -> Self {
        AtomicConfig {
            seed: None,
            guards_before_exhaustive: None,
            show_output: true,
            output_headers: true,
        }
    }
}

impl AtomicConfig {
    pub fn seeded(seed: u64) -> Self {
        AtomicConfig {
            seed: Some(seed),
            ..Default::default()
        }
    }
}

/// Pool construction and candidate choice
pub trait RulePolicy {
    /// Pool the random phase draws from; may repeat rules to bias them
    fn make_pool(&mut self, model: &Model, rules: &[RuleId]) -> Vec<RuleId> {
        let _ = model;
        rules.to_vec()
    }

    fn choose(&mut self, pool: &[RuleId], rng: &mut StdRng) -> Option<RuleId> {
        pool.choose(rng).copied()
    }
}

/// Every rule equally likely
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformPolicy;

impl RulePolicy for UniformPolicy {}

/// Per-handler multiplicity in the pool
#[derive(Clone, Debug, Default)]
pub struct WeightedPolicy {
    weights: HashMap<String, usize>,
}

impl WeightedPolicy {
    pub fn new() -> Self {
        WeightedPolicy::default()
    }

    /// Put each rule of handler `name` into the pool `weight` times
    pub fn weight(mut self, name: &str, weight: usize) -> Self {
        self.weights.insert(name.to_string(), weight);
        self
    }
}

impl RulePolicy for WeightedPolicy {
    fn make_pool(&mut self, model: &Model, rules: &[RuleId]) -> Vec<RuleId> {
        let mut pool = Vec::with_capacity(rules.len());
        for &id in rules {
            let weight = model
                .rule(id)
                .ok()
                .and_then(|r| self.weights.get(r.handler_name()))
                .copied()
                .unwrap_or(1);
            pool.extend(std::iter::repeat(id).take(weight));
        }
        pool
    }
}

/// Outcome of a batch of steps
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Invocations committed
    pub invocations: u64,
    /// Random picks that guarded
    pub guarded: u64,
    pub exhaustive_probes: u64,
    pub deadlocked: bool,
}

pub struct AtomicRuleSimulator<P: RulePolicy = UniformPolicy> {
    model: Model,
    policy: P,
    rules: Vec<RuleId>,
    pool: Vec<RuleId>,
    budget: usize,
    rng: StdRng,
    seed: u64,
    config: AtomicConfig,
    invocations: u64,
    deadlocked: bool,
    transcript: Vec<String>,
}

impl AtomicRuleSimulator<UniformPolicy> {
    pub fn new(model: Model) -> Self {
        Self::with_config(model, AtomicConfig::default())
    }

    pub fn with_config(model: Model, config: AtomicConfig) -> Self {
        Self::with_policy(model, config, UniformPolicy)
    }
}

impl<P: RulePolicy> AtomicRuleSimulator<P> {
    pub fn with_policy(model: Model, config: AtomicConfig, mut policy: P) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let rules = model.rules().atomic().to_vec();
        let pool = policy.make_pool(&model, &rules);
        let budget = config
            .guards_before_exhaustive
            .unwrap_or_else(|| (pool.len() / 2).max(1));
        AtomicRuleSimulator {
            model,
            policy,
            rules,
            pool,
            budget,
            rng: StdRng::seed_from_u64(seed),
            seed,
            config,
            invocations: 0,
            deadlocked: false,
            transcript: Vec::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Harness access between steps, e.g. to push port data
    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn pool(&self) -> &[RuleId] {
        &self.pool
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn deadlocked(&self) -> bool {
        self.deadlocked
    }

    /// Invocations committed since construction
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Output lines of committed invocations
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Commit up to `count` invocations, stopping early on deadlock
    pub fn run(&mut self, count: u64) -> OrchidResult<RunReport> {
        let mut report = RunReport::default();
        self.deadlocked = false;
        for _ in 0..count {
            if self.step_with(&mut report)?.is_none() {
                break;
            }
        }
        report.deadlocked = self.deadlocked;
        info!(
            seed = self.seed,
            invocations = report.invocations,
            guarded = report.guarded,
            probes = report.exhaustive_probes,
            deadlocked = report.deadlocked,
            "atomic run finished"
        );
        Ok(report)
    }

    /// Commit one invocation; `None` means deadlock
    pub fn step(&mut self) -> OrchidResult<Option<RuleId>> {
        let mut report = RunReport::default();
        self.step_with(&mut report)
    }

    fn step_with(&mut self, report: &mut RunReport) -> OrchidResult<Option<RuleId>> {
        for _ in 0..self.budget {
            let Some(rule) = self.policy.choose(&self.pool, &mut self.rng) else {
                break;
            };
            let invocation = self.model.invoke(rule);
            match invocation.outcome() {
                Outcome::Applied => {
                    self.commit(&invocation, report);
                    return Ok(Some(rule));
                }
                Outcome::Guarded => report.guarded += 1,
                Outcome::Failed(e) => return Err(e.clone()),
            }
        }

        report.exhaustive_probes += 1;
        let mut candidates: Vec<(RuleId, Invocation)> = Vec::new();
        for i in 0..self.rules.len() {
            let rule = self.rules[i];
            let invocation = self.model.invoke(rule);
            match invocation.outcome() {
                Outcome::Applied => {
                    self.model.revert(&invocation)?;
                    candidates.push((rule, invocation));
                }
                Outcome::Guarded => {}
                Outcome::Failed(e) => return Err(e.clone()),
            }
        }

        if candidates.is_empty() {
            warn!(seed = self.seed, invocations = self.invocations, "system deadlock");
            self.deadlocked = true;
            return Ok(None);
        }
        let pick = self.rng.gen_range(0..candidates.len());
        let (rule, invocation) = candidates.swap_remove(pick);
        self.model.apply(&invocation)?;
        self.commit(&invocation, report);
        Ok(Some(rule))
    }

    fn commit(&mut self, invocation: &Invocation, report: &mut RunReport) {
        self.invocations += 1;
        report.invocations += 1;
        if self.config.show_output {
            for line in invocation.flush_output(self.config.output_headers) {
                info!(target: "orchid::output", "{}", line);
                self.transcript.push(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelBuilder;
    use orchid_core::{LeafKind, Value};

    fn countdown(start: i64) -> Model {
        let mut b = ModelBuilder::new("top");
        let root = b.root();
        b.tree()
            .add_cell(root, "n", LeafKind::bounded(100), Some(Value::Int(start)))
            .unwrap();
        b.rule(root, "dec", vec![], |t, _| {
            let n = t.cell("n")?;
            let v = t.read_int(n)?;
            t.guard(v > 0)?;
            t.print(format!("n = {}", v - 1));
            t.write(n, v - 1)
        })
        .unwrap();
        b.rule(root, "never", vec![], |t, _| t.guard(false)).unwrap();
        b.build().unwrap()
    }

    fn count(sim: &AtomicRuleSimulator<impl RulePolicy>) -> i64 {
        let n = sim.model().tree().lookup_cell("top.n").unwrap();
        sim.model().tree().read(n).unwrap().as_int().unwrap()
    }

    #[test]
    fn test_runs_until_deadlock() {
        let mut sim = AtomicRuleSimulator::with_config(countdown(5), AtomicConfig::seeded(7));
        let report = sim.run(100).unwrap();
        assert_eq!(report.invocations, 5);
        assert!(report.deadlocked);
        assert!(sim.deadlocked());
        assert_eq!(count(&sim), 0);
        assert_eq!(sim.transcript().last().map(String::as_str), Some("top.dec(): n = 0"));
    }

    #[test]
    fn test_default_budget_is_half_pool() {
        let sim = AtomicRuleSimulator::new(countdown(1));
        assert_eq!(sim.pool().len(), 2);
        assert_eq!(sim.budget(), 1);
    }

    #[test]
    fn test_same_seed_same_transcript() {
        let mut a = AtomicRuleSimulator::with_config(countdown(30), AtomicConfig::seeded(99));
        let mut b = AtomicRuleSimulator::with_config(countdown(30), AtomicConfig::seeded(99));
        a.run(10).unwrap();
        b.run(10).unwrap();
        assert_eq!(a.transcript(), b.transcript());
        assert_eq!(a.model().state_hash(), b.model().state_hash());
    }

    #[test]
    fn test_weighted_policy_repeats_rules() {
        let policy = WeightedPolicy::new().weight("dec", 3).weight("never", 0);
        let sim = AtomicRuleSimulator::with_policy(countdown(3), AtomicConfig::seeded(1), policy);
        assert_eq!(sim.pool().len(), 3);
    }

    #[test]
    fn test_defect_aborts_run() {
        let mut b = ModelBuilder::new("top");
        let root = b.root();
        b.rule(root, "broken", vec![], |t, _| t.ensure(false, "invariant")).unwrap();
        let mut sim = AtomicRuleSimulator::with_config(b.build().unwrap(), AtomicConfig::seeded(3));
        assert!(sim.run(1).is_err());
    }

    #[test]
    fn test_empty_model_deadlocks() {
        let model = ModelBuilder::new("top").build().unwrap();
        let mut sim = AtomicRuleSimulator::with_config(model, AtomicConfig::seeded(0));
        assert_eq!(sim.step().unwrap(), None);
        assert!(sim.deadlocked());
    }
}
