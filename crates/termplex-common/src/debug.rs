//! Debug-logging bootstrap.
//!
//! Setting `TERMPLEX_DEBUG=1` in the environment turns on human-readable
//! debug lines on the host process's standard error stream.

use tracing_subscriber::EnvFilter;

/// Environment variable that enables debug output when set to `1`.
pub const DEBUG_ENV_VAR: &str = "TERMPLEX_DEBUG";

/// Returns `true` if debug logging was requested via [`DEBUG_ENV_VAR`].
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV_VAR).map(|v| v == "1").unwrap_or(false)
}

/// Install a global `tracing` subscriber writing to stderr.
///
/// The default level is `info`; `TERMPLEX_DEBUG=1` raises it to `debug`.
/// `RUST_LOG` still takes precedence when set. Calling this more than once
/// is harmless — later calls are ignored.
pub fn init_debug_logging() {
    let default_directive = if debug_enabled() { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_disabled_by_default() {
        // The test environment does not set TERMPLEX_DEBUG.
        if std::env::var(DEBUG_ENV_VAR).is_err() {
            assert!(!debug_enabled());
        }
    }

    #[test]
    fn init_is_idempotent() {
        init_debug_logging();
        init_debug_logging();
    }
}
