//! Tracing initialization for processor binaries.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Filter via `RUST_LOG` (e.g. `RUST_LOG=mixcat_jobs=debug,info`); defaults
/// to `info`. Safe to call more than once — later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
