//! Structured tracing helpers.

use sark_config::AppMode;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber.
///
/// Development and staging default to `info` with a human-readable
/// formatter; production defaults to `info` as well but callers are
/// expected to override via `RUST_LOG` for quieter/noisier deployments.
/// Safe to call once per process; a second call is a no-op (the
/// underlying `set_global_default` error is swallowed, mirroring
/// `tracing`'s own guidance for libraries that may be initialized more
/// than once in tests).
pub fn init_subscriber(mode: AppMode) {
    let default_directive = match mode {
        AppMode::Development => "debug",
        AppMode::Staging | AppMode::Production => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
