//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Later calls are no-ops, so the
/// frontend and tests can both call this freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
