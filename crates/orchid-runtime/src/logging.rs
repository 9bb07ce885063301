//! Diagnostics via `tracing`
//!
//! Rule output flushed by the simulators is logged at `info` on target
//! `orchid::output`; engine events use the crate targets.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install a compact stderr subscriber filtered by `RUST_LOG` (default `warn`).
///
/// # Example
/// ```bash
/// RUST_LOG=orchid::output=info,orchid_verify=debug cargo run --bin scoreboard
/// ```
///
/// Panics if a global subscriber is already set.
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Like [`init`], but returns `false` instead of panicking when a subscriber
/// is already installed
pub fn try_init() -> bool {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_twice() {
        try_init();
        assert!(!try_init());
    }
}
