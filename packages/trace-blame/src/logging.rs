//! Logger setup shared by the binary and embedding hosts.

use env_logger::{Builder, Env};

/// Installs `env_logger`. `RUST_LOG` wins; otherwise `verbose` picks between
/// `debug` and `warn`. Calling this twice is harmless.
pub fn init(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .try_init()
        .ok();
}
