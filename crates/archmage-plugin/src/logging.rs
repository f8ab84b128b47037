//! Tracing subscriber bootstrap for host binaries and tests.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install a global `fmt` subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already installed; calling
/// this more than once is harmless.
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    init_with_filter(filter)
}

/// Install a global `fmt` subscriber with an explicit filter directive,
/// e.g. `"archmage_plugin=debug,archmage::console=info"`.
pub fn init_logging_with(directives: &str) -> bool {
    init_with_filter(EnvFilter::new(directives))
}

fn init_with_filter(filter: EnvFilter) -> bool {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init()
        .is_ok()
}
