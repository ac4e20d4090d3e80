//! Logging initialization for frontend-core services.
//!
//! Call [`init`] once at startup; everything else uses the standard
//! `tracing` macros and has no knowledge of where log lines go.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Install the global tracing subscriber.
///
/// Level defaults to `info` and can be overridden with `RUST_LOG`.
/// Safe to call more than once; later calls are no-ops.
pub fn init(service: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();

        tracing::info!(service, "logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init("test");
        init("test"); // must not panic on double-install
    }
}
