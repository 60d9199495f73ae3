//! Tracing Setup
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the embedding application. `init_tracing` is the default setup used by
//! binaries and the test suites.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "orgtree_core=info";

/// Install a formatting subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
