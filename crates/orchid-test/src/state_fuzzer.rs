//! State Hash Fuzzer - random invocation sequences against the state hash
//!
//! Checks:
//! - the incremental hash always equals a from-scratch recomputation
//! - revert restores the pre-invocation hash
//! - guarded invocations leave no trace
//! - equal states hash equal, distinct states do not collide

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use orchid_core::{CellValue, OrchidResult, RuleId};
use orchid_runtime::Model;
use orchid_state::Outcome;

/// Fuzzer configuration
#[derive(Clone, Debug)]
pub struct FuzzerConfig {
    /// Number of random invocations
    pub steps: usize,
    /// Probability of reverting an applied invocation right away
    pub revert_prob: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        FuzzerConfig {
            steps: 1000,
            revert_prob: 0.2,
            seed: 42,
        }
    }
}

impl FuzzerConfig {
    /// Light fuzzing for quick tests
    pub fn light() -> Self {
        FuzzerConfig {
            steps: 100,
            revert_prob: 0.1,
            seed: 42,
        }
    }

    /// Heavy fuzzing for thorough testing
    pub fn heavy() -> Self {
        FuzzerConfig {
            steps: 20_000,
            revert_prob: 0.3,
            seed: 42,
        }
    }
}

/// Fuzzing result
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FuzzResult {
    pub invocations: u64,
    pub guarded: u64,
    pub reverts: u64,
    pub distinct_states: usize,
    /// Incremental hash differed from recomputation
    pub hash_mismatches: u64,
    /// Revert did not restore the previous hash
    pub revert_mismatches: u64,
    /// A guarded invocation changed the hash
    pub guard_leaks: u64,
    /// Distinct states with the same hash
    pub collisions: u64,
    /// Equal states with different hashes
    pub unstable_hashes: u64,
}

impl FuzzResult {
    pub fn is_clean(&self) -> bool {
        self.hash_mismatches == 0
            && self.revert_mismatches == 0
            && self.guard_leaks == 0
            && self.collisions == 0
            && self.unstable_hashes == 0
    }
}

/// State hash fuzzer
pub struct StateHashFuzzer {
    config: FuzzerConfig,
    model: Model,
    rules: Vec<RuleId>,
    rng: StdRng,
    by_hash: HashMap<u64, Vec<CellValue>>,
    by_state: HashMap<Vec<CellValue>, u64>,
}

impl StateHashFuzzer {
    pub fn new(model: Model, config: FuzzerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let rules = model.rules().atomic().to_vec();
        StateHashFuzzer {
            config,
            model,
            rules,
            rng,
            by_hash: HashMap::new(),
            by_state: HashMap::new(),
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Record the current state; flags collisions and unstable hashes
    fn observe(&mut self, result: &mut FuzzResult) {
        let hash = self.model.state_hash();
        if hash != self.model.tree().recompute_hash() {
            result.hash_mismatches += 1;
        }
        let state = self.model.tree().values();
        match self.by_hash.get(&hash) {
            Some(known) if *known != state => result.collisions += 1,
            Some(_) => {}
            None => {
                self.by_hash.insert(hash, state.clone());
            }
        }
        match self.by_state.get(&state) {
            Some(&known) if known != hash => result.unstable_hashes += 1,
            Some(_) => {}
            None => {
                self.by_state.insert(state, hash);
            }
        }
    }

    /// Run the fuzzer
    ///
    /// Rule defects abort the run; everything else is counted.
    pub fn run(&mut self) -> OrchidResult<FuzzResult> {
        let mut result = FuzzResult::default();
        self.observe(&mut result);
        if self.rules.is_empty() {
            result.distinct_states = self.by_state.len();
            return Ok(result);
        }

        for _ in 0..self.config.steps {
            let rule = self.rules[self.rng.gen_range(0..self.rules.len())];
            let before = self.model.state_hash();
            let invocation = self.model.invoke(rule);
            result.invocations += 1;
            match invocation.outcome() {
                Outcome::Applied => {
                    if self.rng.gen::<f64>() < self.config.revert_prob {
                        self.model.revert(&invocation)?;
                        result.reverts += 1;
                        if self.model.state_hash() != before {
                            result.revert_mismatches += 1;
                        }
                    }
                }
                Outcome::Guarded => {
                    result.guarded += 1;
                    if self.model.state_hash() != before {
                        result.guard_leaks += 1;
                    }
                }
                Outcome::Failed(e) => return Err(e.clone()),
            }
            self.observe(&mut result);
        }

        result.distinct_states = self.by_state.len();
        Ok(result)
    }
}

/// Transaction properties over a single rule
pub mod properties {
    use super::*;

    /// Applying a recorded invocation lands on the same state as running it
    pub fn apply_equivalent(model: &mut Model, rule: RuleId) -> OrchidResult<bool> {
        let invocation = model.invoke(rule);
        if !invocation.is_applied() {
            return Ok(true);
        }
        let executed = model.tree().values();
        model.revert(&invocation)?;
        model.apply(&invocation)?;
        Ok(model.tree().values() == executed && model.state_hash() == invocation.hash_after())
    }

    /// `apply` then `revert` restores values and hash
    pub fn revert_restores(model: &mut Model, rule: RuleId) -> OrchidResult<bool> {
        let values = model.tree().values();
        let hash = model.state_hash();
        let invocation = model.invoke(rule);
        if invocation.is_applied() {
            model.revert(&invocation)?;
        }
        Ok(model.tree().values() == values && model.state_hash() == hash)
    }

    /// Replaying a rule sequence from the same start yields the same hashes
    pub fn hash_sequence(model: &mut Model, rules: &[RuleId]) -> Vec<u64> {
        rules
            .iter()
            .map(|&rule| {
                model.invoke(rule);
                model.state_hash()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{bomb, counter_mod8, shapes, three_ints};
    use proptest::prelude::*;

    #[test]
    fn test_fuzzer_light() {
        let mut fuzzer = StateHashFuzzer::new(three_ints().unwrap(), FuzzerConfig::light());
        let result = fuzzer.run().unwrap();
        assert!(result.is_clean(), "{:?}", result);
        assert_eq!(result.invocations, 100);
    }

    #[test]
    fn test_fuzzer_default_three_ints() {
        let mut fuzzer = StateHashFuzzer::new(three_ints().unwrap(), FuzzerConfig::default());
        let result = fuzzer.run().unwrap();
        assert!(result.is_clean(), "{:?}", result);
        assert!(result.distinct_states > 100);
        assert!(result.reverts > 0);
    }

    #[test]
    fn test_fuzzer_union_model() {
        let config = FuzzerConfig {
            seed: 7,
            ..FuzzerConfig::default()
        };
        let mut fuzzer = StateHashFuzzer::new(shapes().unwrap(), config);
        let result = fuzzer.run().unwrap();
        assert!(result.is_clean(), "{:?}", result);
        assert!(result.guarded > 0);
    }

    #[test]
    fn test_fuzzer_until_deadlock() {
        let mut fuzzer = StateHashFuzzer::new(bomb(10).unwrap(), FuzzerConfig::light());
        let result = fuzzer.run().unwrap();
        assert!(result.is_clean(), "{:?}", result);
        assert!(result.distinct_states <= 16);
    }

    #[test]
    fn test_counter_hash_cycles() {
        let mut model = counter_mod8().unwrap();
        let rule = model.rules().atomic()[0];
        let hashes = properties::hash_sequence(&mut model, &[rule; 16]);
        assert_eq!(hashes[..8], hashes[8..]);
        assert_eq!(hashes[7], counter_mod8().unwrap().state_hash());
    }

    proptest! {
        #[test]
        fn prop_apply_and_revert(picks in proptest::collection::vec(0usize..48, 1..40)) {
            let mut model = three_ints().unwrap();
            let rules = model.rules().atomic().to_vec();
            for pick in picks {
                let rule = rules[pick % rules.len()];
                prop_assert!(properties::revert_restores(&mut model, rule).unwrap());
                prop_assert!(properties::apply_equivalent(&mut model, rule).unwrap());
            }
        }

        #[test]
        fn prop_hash_sequence_deterministic(picks in proptest::collection::vec(0usize..64, 0..30)) {
            let mut a = shapes().unwrap();
            let mut b = shapes().unwrap();
            let rules = a.rules().atomic().to_vec();
            let sequence: Vec<RuleId> = picks.iter().map(|p| rules[p % rules.len()]).collect();
            prop_assert_eq!(
                properties::hash_sequence(&mut a, &sequence),
                properties::hash_sequence(&mut b, &sequence)
            );
        }
    }
}
