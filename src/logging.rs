//! Diagnostic logging setup
//!
//! Library code logs through `tracing`; the binary installs a `fmt` subscriber
//! that writes to stderr so stdout stays free for install summaries. The level
//! comes from `RUST_LOG` when set, otherwise `warn` (or `error` when quiet).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter directive when `RUST_LOG` is unset
pub fn default_directive(quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else {
        "warn"
    }
}

/// Install the global subscriber
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.
pub fn init_logging(quiet: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(quiet)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
