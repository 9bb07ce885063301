//! Atomic Simulation Example
//!
//! A countdown races a defuse rule. The random picker is forced to miss,
//! so every step goes through the exhaustive probe.

use orchid_core::OrchidResult;
use orchid_runtime::{logging, AtomicConfig, AtomicRuleSimulator};
use orchid_test::{bomb, FixedPolicy, BOMB_PHASES};

fn main() -> OrchidResult<()> {
    logging::try_init();
    println!("=== Orchid Atomic Simulation ===\n");

    let seed = std::env::args().nth(1).and_then(|s| s.parse().ok());
    let config = AtomicConfig {
        seed,
        guards_before_exhaustive: Some(50),
        ..Default::default()
    };
    let mut sim = AtomicRuleSimulator::with_policy(bomb(10)?, config, FixedPolicy::new("arm"));
    println!("Seed: {}", sim.seed());
    println!("Rules: {}", sim.pool().len());
    println!("{}", sim.model().tree().render());

    let report = sim.run(1_000)?;
    for line in sim.transcript() {
        println!("   {}", line);
    }

    let tree = sim.model().tree();
    let phase = tree.read(tree.lookup_cell("bomb.phase")?)?.as_enum().unwrap_or(0);
    println!("\nInvocations: {}", report.invocations);
    println!("Missed picks: {}", report.guarded);
    println!("Exhaustive probes: {}", report.exhaustive_probes);
    println!("Deadlocked: {}", report.deadlocked);
    println!("Final phase: {}", BOMB_PHASES[phase as usize % BOMB_PHASES.len()]);
    Ok(())
}
