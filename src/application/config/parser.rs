use crate::application::config::models::ListenerConfig;
use crate::common::error::{ListenerError, Result};
use std::fs;
use std::path::Path;

/// Parse configuration from TOML file
pub fn parse_config_file(path: impl AsRef<Path>) -> Result<ListenerConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        ListenerError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&content)
}

/// Parse configuration from TOML string
pub fn parse_config(content: &str) -> Result<ListenerConfig> {
    toml::from_str(content).map_err(|e| {
        ListenerError::ConfigError(format!("Failed to parse TOML config: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::constants::{DEFAULT_BACKLOG, DEFAULT_POLL_INTERVAL_MS};

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config(r#"address = "127.0.0.1:8080""#).unwrap();
        assert_eq!(config.address, "127.0.0.1:8080");
        assert_eq!(config.backlog, DEFAULT_BACKLOG);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            address = "0.0.0.0:9000"
            backlog = 16
            poll_interval_ms = 100
            queue_capacity = 8
            dispatch_timeout_ms = 50
            log_level = "debug"
        "#;

        let config = parse_config(toml).unwrap();
        assert_eq!(config.backlog, 16);
        assert_eq!(config.poll_interval().as_millis(), 100);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.dispatch_timeout().as_millis(), 50);
    }

    #[test]
    fn test_missing_address() {
        assert!(matches!(
            parse_config("backlog = 4"),
            Err(ListenerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_config_file("/nonexistent/listener.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
