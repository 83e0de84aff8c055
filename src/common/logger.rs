use crate::common::error::{ListenerError, Result};
use std::sync::Once;
use tracing::Level;

static INIT: Once = Once::new();

/// Installs the process-wide `tracing` subscriber.
///
/// The first call wins; later calls are no-ops, so tests and the binary can
/// both call it freely.
pub struct Logger;

impl Logger {
    pub fn init(level: Level) {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_max_level(level)
                .with_target(true)
                .with_thread_names(true)
                .try_init();
        });
    }

    pub fn init_for_tests() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_max_level(Level::DEBUG)
                .with_test_writer()
                .with_thread_names(true)
                .with_ansi(false)
                .try_init();
        });
    }

    pub fn parse_level(level: &str) -> Result<Level> {
        level.parse::<Level>().map_err(|_| {
            ListenerError::ConfigError(format!("Unknown log level '{}'", level))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(Logger::parse_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(Logger::parse_level("WARN").unwrap(), Level::WARN);
        assert!(Logger::parse_level("loud").is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        Logger::init_for_tests();
        Logger::init(Level::INFO);
    }
}
