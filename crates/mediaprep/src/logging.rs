//! Tracing subscriber setup for embedding binaries.
//!
//! The crate logs through both `log` macros (db, broker, workers) and
//! `tracing` spans (the inspection pipeline); this wires the two into
//! one subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initializes a formatted subscriber with an `RUST_LOG`-style filter,
/// bridging `log` records into tracing. Safe to call more than once;
/// later calls are no-ops.
pub fn init(default_filter: &str) {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
