//! Observability utilities.

use tracing_subscriber::EnvFilter;

/// Installs a global tracing subscriber for pipeline diagnostics.
///
/// `default_filter` applies when `RUST_LOG` is unset. Returns false if a
/// subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
