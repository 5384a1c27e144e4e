//! Tracing bootstrap
//!
//! Libraries only emit spans and events; installing a subscriber is the
//! embedder's call. This helper wires the usual `RUST_LOG`-driven
//! formatter for binaries, examples and tests.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber with env-filter support. Safe to
/// call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
