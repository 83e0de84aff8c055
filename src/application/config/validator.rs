use crate::application::config::models::ListenerConfig;
use crate::common::constants::MAX_BACKLOG;
use crate::common::error::{ListenerError, Result};
use crate::common::logger::Logger;
use crate::core::net::address::Address;

/// Validate configuration for correctness
pub fn validate_config(config: &ListenerConfig) -> Result<()> {
    validate_address(config)?;
    validate_limits(config)?;
    Logger::parse_level(&config.log_level)?;
    Ok(())
}

fn validate_address(config: &ListenerConfig) -> Result<()> {
    Address::parse(&config.address).map_err(|e| {
        ListenerError::ConfigError(format!("Invalid address '{}': {}", config.address, e))
    })?;
    Ok(())
}

fn validate_limits(config: &ListenerConfig) -> Result<()> {
    if config.backlog == 0 || config.backlog > MAX_BACKLOG {
        return Err(ListenerError::ConfigError(format!(
            "backlog must be between 1 and {}",
            MAX_BACKLOG
        )));
    }

    if config.poll_interval_ms == 0 {
        return Err(ListenerError::ConfigError(
            "poll_interval_ms must be greater than 0".to_string(),
        ));
    }

    if config.queue_capacity == 0 {
        return Err(ListenerError::ConfigError(
            "queue_capacity must be greater than 0".to_string(),
        ));
    }

    if config.dispatch_timeout_ms == 0 {
        return Err(ListenerError::ConfigError(
            "dispatch_timeout_ms must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
