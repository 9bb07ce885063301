//! Check search - an online scoreboard
//!
//! Looks for an interleaving of reference-model rule invocations that
//! reproduces every observed output of a co-simulated implementation.
//! The search is a depth-first walk over committed invocations:
//! - at each depth the candidate cursor scans every atomic rule in order
//! - a rule that applies is committed and the search descends
//! - when a depth runs out of candidates the last commit is reverted and
//!   its resulting state is remembered as a dead end
//!
//! Rules that run out of external data ask for more; the search then
//! fetches the next chunk of co-simulation steps and retries the same
//! candidate.
//!
//! Dead ends and states on the current path are recognised by state hash
//! alone. A hash collision can therefore prune a state that was never
//! explored; [`SearchConfig::exact`] turns both prunings off.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use orchid_core::{OrchidError, OrchidResult, RuleId};
use orchid_runtime::Model;
use orchid_state::{Invocation, Outcome};

use crate::{CoSimulation, PortFeed};

/// Search configuration
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Skip candidates whose resulting state already proved a dead end
    pub memoize_dead_ends: bool,
    /// Skip candidates that lead back to a state on the current path
    pub prune_on_path_cycles: bool,
    /// Maximum number of committed invocations
    pub max_depth: Option<usize>,
    /// Treat rule defects like guards instead of aborting the search
    pub defects_as_guards: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            memoize_dead_ends: true,
            prune_on_path_cycles: true,
            max_depth: None,
            defects_as_guards: false,
        }
    }
}

impl SearchConfig {
    /// No hash-based pruning; exponential but never misled by collisions
    ///
    /// Rules that can undo each other need `max_depth` to terminate.
    pub fn exact() -> Self {
        SearchConfig {
            memoize_dead_ends: false,
            prune_on_path_cycles: false,
            ..Default::default()
        }
    }
}

/// Diagnostic counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchStats {
    pub rules_tried: u64,
    pub guarded: u64,
    pub committed: u64,
    pub backtracks: u64,
    /// Candidates skipped by the dead-end memo or cycle check
    pub pruned: u64,
    /// Distinct states recorded on the path
    pub states_memoized: u64,
    pub dead_ends_recorded: u64,
    pub fetches: u64,
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// Every observed output was reproduced
    Success {
        history: Vec<RuleId>,
        labels: Vec<String>,
    },
    /// No ordering of the reference rules explains the observed outputs
    Failure {
        /// Deepest committed stack ever reached
        deepest_history: Vec<RuleId>,
        deepest_labels: Vec<String>,
        /// Observed outputs still unmatched at the deepest point
        open_depth: usize,
        /// The co-simulation ran dry; `false` when the step budget ran out first
        source_exhausted: bool,
    },
}

impl SearchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SearchOutcome::Success { .. })
    }

    /// Committed history on success, deepest history on failure
    pub fn history(&self) -> &[RuleId] {
        match self {
            SearchOutcome::Success { history, .. } => history,
            SearchOutcome::Failure { deepest_history, .. } => deepest_history,
        }
    }

    pub fn labels(&self) -> &[String] {
        match self {
            SearchOutcome::Success { labels, .. } => labels,
            SearchOutcome::Failure { deepest_labels, .. } => deepest_labels,
        }
    }
}

struct Frame {
    rule: RuleId,
    invocation: Invocation,
    /// Cursor to resume from at the parent depth
    resume: usize,
}

pub struct CheckSearch<C: CoSimulation> {
    model: Model,
    cosim: C,
    config: SearchConfig,
    rules: Vec<RuleId>,
    stack: Vec<Frame>,
    cursor: usize,
    dead_ends: HashSet<u64>,
    on_path: HashMap<u64, u32>,
    budget: u64,
    chunk: u64,
    source_exhausted: bool,
    deepest: Vec<RuleId>,
    deepest_unmatched: usize,
    stats: SearchStats,
}

impl<C: CoSimulation> CheckSearch<C> {
    pub fn new(model: Model, cosim: C) -> Self {
        Self::with_config(model, cosim, SearchConfig::default())
    }

    pub fn with_config(model: Model, cosim: C, config: SearchConfig) -> Self {
        let rules = model.rules().atomic().to_vec();
        CheckSearch {
            model,
            cosim,
            config,
            rules,
            stack: Vec::new(),
            cursor: 0,
            dead_ends: HashSet::new(),
            on_path: HashMap::new(),
            budget: 0,
            chunk: 1,
            source_exhausted: false,
            deepest: Vec::new(),
            deepest_unmatched: 0,
            stats: SearchStats::default(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn cosim(&self) -> &C {
        &self.cosim
    }

    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    /// Rules committed on the current path
    pub fn history(&self) -> Vec<RuleId> {
        self.stack.iter().map(|f| f.rule).collect()
    }

    fn labels(&self, rules: &[RuleId]) -> OrchidResult<Vec<String>> {
        rules
            .iter()
            .map(|&id| self.model.rule(id).map(|r| r.label().to_string()))
            .collect()
    }

    fn can_fetch(&self) -> bool {
        !self.source_exhausted && self.budget > 0
    }

    /// Pull the next chunk of co-simulation steps into the model's ports
    fn fetch(&mut self) -> OrchidResult<u64> {
        let want = self.chunk.min(self.budget);
        let produced = {
            let mut feed = PortFeed::new(&mut self.model);
            self.cosim.advance(&mut feed, want)?
        };
        self.budget = self.budget.saturating_sub(produced);
        if produced == 0 {
            self.source_exhausted = true;
        }
        if !self.can_fetch() {
            self.model.close_ports();
        }
        // queue contents are not hashed, so new data can revive dead states
        self.dead_ends.clear();
        self.stats.fetches += 1;
        debug!(
            produced,
            budget = self.budget,
            exhausted = self.source_exhausted,
            unmatched = self.model.unmatched_outputs(),
            "stimulus fetched"
        );
        Ok(produced)
    }

    fn settled(&self) -> bool {
        self.model.unmatched_outputs() == 0 && self.model.pending_stimulus() == 0
    }

    fn enter(&mut self, hash: u64) {
        let count = self.on_path.entry(hash).or_insert(0);
        if *count == 0 {
            self.stats.states_memoized += 1;
        }
        *count += 1;
    }

    fn leave(&mut self, hash: u64) {
        if let Some(count) = self.on_path.get_mut(&hash) {
            *count -= 1;
            if *count == 0 {
                self.on_path.remove(&hash);
            }
        }
    }

    fn pruned(&self, hash: u64) -> bool {
        (self.config.memoize_dead_ends && self.dead_ends.contains(&hash))
            || (self.config.prune_on_path_cycles && self.on_path.contains_key(&hash))
    }

    fn commit(&mut self, rule: RuleId, invocation: Invocation) {
        self.enter(invocation.hash_after());
        self.stack.push(Frame {
            rule,
            invocation,
            resume: self.cursor + 1,
        });
        self.cursor = 0;
        self.stats.committed += 1;
        if self.stack.len() > self.deepest.len() {
            self.deepest = self.history();
            self.deepest_unmatched = self.model.unmatched_outputs();
        }
        self.stats.max_depth = self.stats.max_depth.max(self.stack.len());
    }

    /// Revert the last commit and mark its state as a dead end
    fn backtrack(&mut self) -> OrchidResult<()> {
        let Some(frame) = self.stack.pop() else {
            return Ok(());
        };
        self.model.revert(&frame.invocation)?;
        let dead = frame.invocation.hash_after();
        self.leave(dead);
        if self.config.memoize_dead_ends && self.dead_ends.insert(dead) {
            self.stats.dead_ends_recorded += 1;
        }
        self.cursor = frame.resume;
        self.stats.backtracks += 1;
        debug!(depth = self.stack.len(), rule = %frame.invocation.label(), "backtrack");
        Ok(())
    }

    /// Search for an interleaving that reproduces up to `total` steps of the
    /// co-simulation, fetched `chunk` steps at a time
    pub fn checksearch(&mut self, total: u64, chunk: u64) -> OrchidResult<SearchOutcome> {
        self.budget = total;
        self.chunk = chunk.max(1);
        self.source_exhausted = false;
        self.model.reopen_ports();
        if self.stack.is_empty() {
            let root = self.model.state_hash();
            self.on_path.clear();
            self.enter(root);
        }
        self.fetch()?;

        loop {
            if self.settled() {
                if self.can_fetch() {
                    self.fetch()?;
                    continue;
                }
                return self.success();
            }

            let at_limit = self.config.max_depth.is_some_and(|max| self.stack.len() >= max);
            if at_limit || self.cursor >= self.rules.len() {
                if !self.stack.is_empty() {
                    self.backtrack()?;
                    continue;
                }
                if self.can_fetch() {
                    self.fetch()?;
                    self.cursor = 0;
                    continue;
                }
                return self.failure();
            }

            let rule = self.rules[self.cursor];
            let invocation = self.model.invoke(rule);
            self.stats.rules_tried += 1;
            if invocation.is_applied() {
                // a rule that changes nothing cannot make progress
                if invocation.changes().is_empty() || self.pruned(invocation.hash_after()) {
                    self.model.revert(&invocation)?;
                    self.stats.pruned += 1;
                    self.cursor += 1;
                } else {
                    self.commit(rule, invocation);
                }
                continue;
            }
            match invocation.outcome() {
                Outcome::Applied => {}
                Outcome::Guarded => {
                    self.stats.guarded += 1;
                    self.cursor += 1;
                }
                Outcome::Failed(e) if e.is_need_more_stimulus() => {
                    if self.can_fetch() {
                        self.fetch()?;
                    } else {
                        // ports are closed once nothing more can arrive
                        self.model.close_ports();
                    }
                }
                Outcome::Failed(e) if self.config.defects_as_guards && !e.is_fatal() => {
                    debug!(rule = %invocation.label(), error = %e, "defect treated as guard");
                    self.stats.guarded += 1;
                    self.cursor += 1;
                }
                Outcome::Failed(e) => return Err(e.clone()),
            }
        }
    }

    fn success(&self) -> OrchidResult<SearchOutcome> {
        let history = self.history();
        let labels = self.labels(&history)?;
        info!(
            depth = history.len(),
            tried = self.stats.rules_tried,
            backtracks = self.stats.backtracks,
            dead_ends = self.stats.dead_ends_recorded,
            "check search matched"
        );
        Ok(SearchOutcome::Success { history, labels })
    }

    fn failure(&self) -> OrchidResult<SearchOutcome> {
        let deepest_labels = self.labels(&self.deepest)?;
        warn!(
            deepest = self.deepest.len(),
            unmatched = self.deepest_unmatched,
            tried = self.stats.rules_tried,
            "check search found no matching order"
        );
        Ok(SearchOutcome::Failure {
            deepest_history: self.deepest.clone(),
            deepest_labels,
            open_depth: self.deepest_unmatched,
            source_exhausted: self.source_exhausted,
        })
    }
}

/// Re-execute `history` on `model`, committing each step
///
/// Fails on the first rule that does not apply. Returns the number of
/// invocations replayed.
pub fn replay(model: &mut Model, history: &[RuleId]) -> OrchidResult<usize> {
    for (step, &rule) in history.iter().enumerate() {
        let invocation = model.invoke(rule);
        match invocation.outcome() {
            Outcome::Applied => {}
            Outcome::Guarded => {
                return Err(OrchidError::RuleFailed(format!(
                    "replay step {} ({}) guarded",
                    step,
                    invocation.label()
                )))
            }
            Outcome::Failed(e) => return Err(e.clone()),
        }
    }
    Ok(history.len())
}
