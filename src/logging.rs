//! Logging setup
//!
//! Everything in the crate logs through the `log` facade with a
//! `[Subsystem::function]` prefix. Hosts that already install a logger can
//! skip this module entirely.

use env_logger::{Builder, Env};

/// Install an `env_logger` backend honouring `RUST_LOG`.
///
/// `default_filter` applies when `RUST_LOG` is unset. Calling this more than
/// once is harmless; later calls leave the first logger in place.
pub fn init_logging(default_filter: &str) -> bool {
    let result = Builder::from_env(Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();

    match result {
        Ok(()) => {
            log::info!("[Logging::init_logging] Logger installed (default filter '{}')", default_filter);
            true
        }
        Err(_) => {
            log::debug!("[Logging::init_logging] Logger already installed, keeping it");
            false
        }
    }
}

/// Logger for unit tests: captured output, all levels.
pub fn init_test_logging() {
    let _ = Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_test_logging();
        // A logger is already installed, so this must not panic and must report false
        assert!(!init_logging("info"));
        assert!(!init_logging("warn"));
    }
}
