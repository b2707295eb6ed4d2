//! Tracing setup for hosts that do not install their own subscriber.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "medcache=info,warn";

/// Install a global subscriber writing human-readable or JSON lines to
/// stdout, filtered by `RUST_LOG` or [`DEFAULT_FILTER`].
///
/// Returns `false` if a global subscriber was already installed, in which
/// case nothing changes.
pub fn init(json: bool) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    installed.is_ok()
}
