//! Scoreboard Example
//!
//! A LIFO implementation runs under the clocked simulator; its requests
//! and completions are checked against a reference model that allows any
//! completion order.

use orchid_core::OrchidResult;
use orchid_runtime::{logging, ClockInput, ClockedConfig, ClockedSimulator};
use orchid_test::{lifo_implementation, reorder_reference, sample_lifo};
use orchid_verify::{CheckSearch, ClockedCoSim, SearchOutcome};
use tracing::info;

const REQUESTS: i64 = 6;

fn main() -> OrchidResult<()> {
    logging::try_init();
    println!("=== Orchid Scoreboard ===\n");

    let dut = ClockedSimulator::with_config(
        lifo_implementation(REQUESTS)?,
        &[ClockInput::period_ps(1000)],
        ClockedConfig::seeded(0),
    )?;
    let cosim = ClockedCoSim::new(dut, sample_lifo).with_limit(2 * REQUESTS as u64);
    let mut search = CheckSearch::new(reorder_reference(REQUESTS + 1)?, cosim);

    let outcome = search.checksearch(100, 4)?;
    info!(stats = ?search.stats(), "search done");
    match &outcome {
        SearchOutcome::Success { labels, .. } => {
            println!("Matched {} invocations:", labels.len());
            for label in labels {
                println!("   {}", label);
            }
        }
        SearchOutcome::Failure { deepest_labels, open_depth, .. } => {
            println!("No matching order; {} outputs unexplained after:", open_depth);
            for label in deepest_labels {
                println!("   {}", label);
            }
        }
    }

    let stats = search.stats();
    println!("\nRules tried: {}", stats.rules_tried);
    println!("Backtracks: {}", stats.backtracks);
    println!("Dead ends recorded: {}", stats.dead_ends_recorded);
    println!("Fetches: {}", stats.fetches);
    Ok(())
}
