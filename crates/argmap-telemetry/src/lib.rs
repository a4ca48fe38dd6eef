//! Tracing setup for argmap.
//!
//! Binaries call [`init_tracing`] once at startup; tests call
//! [`init_test_tracing`], which is safe to call from every test.
//!
//! # Filtering
//!
//! `RUST_LOG` wins when set; otherwise the caller's default directive is
//! used:
//!
//! ```bash
//! RUST_LOG=argmap_engine=debug argmap-sim
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber: env filter plus a stderr fmt layer.
///
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Subscriber for tests: output captured by the test harness, `warn` unless
/// `RUST_LOG` says otherwise. Repeated calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init_test_tracing();
        init_test_tracing();
        assert!(!init_tracing("info"), "global subscriber already set");
    }
}
