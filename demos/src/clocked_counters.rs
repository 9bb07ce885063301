//! Clocked Simulation Example
//!
//! Two clocks at 1000ps and 3333ps drive three counters; one of the
//! counters sits on a clock nested inside the fast one.

use orchid_core::OrchidResult;
use orchid_runtime::{logging, ClockInput, ClockedConfig, ClockedSimulator, RunLength};
use orchid_test::dual_clock;

fn main() -> OrchidResult<()> {
    logging::try_init();
    println!("=== Orchid Clocked Simulation ===\n");

    let model = dual_clock()?;
    for clock in model.find_clock().iter() {
        println!("Schedulable clock: {}", clock.path());
    }

    let inputs = [
        ClockInput::period_ps(1000).named("clk").within("top"),
        ClockInput::frequency_ghz(0.3).named("clk_b"),
    ];
    let mut sim = ClockedSimulator::with_config(model, &inputs, ClockedConfig::seeded(1))?;
    let report = sim.run(RunLength::Duration(99_001))?;

    println!("\nEdges fired: {}", report.edges);
    println!("Last edge: {}ps", sim.time_ps());
    let tree = sim.model().tree();
    for path in ["top.counter", "top.sub.counter_a", "top.sub.counter_b"] {
        println!("   {} = {}", path, tree.read(tree.lookup_cell(path)?)?);
    }
    Ok(())
}
