//! Subscriber setup for the `sitesync` binary.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// A second call is a no-op, which keeps tests that share a process quiet.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
