//! Logging setup for the `histoboard` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the host application.

/// Install a compact stderr subscriber filtered by `RUST_LOG`, falling back
/// to `default_level`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(default_level: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
