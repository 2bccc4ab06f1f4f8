//! Configuration validation.

use crate::config::defaults::{MAX_POOL_SIZE, MIN_POOL_SIZE};
use crate::config::types::TermhiveConfig;
use crate::errors::ConfigError;

/// Validate the merged configuration.
///
/// # Errors
///
/// Returns `ConfigError::InvalidConfiguration` for a pool size outside
/// `[2, 20]`, a zero-sized buffer, a zero request timeout or an empty
/// agent command.
pub fn validate_config(config: &TermhiveConfig) -> Result<(), ConfigError> {
    if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&config.pool.max_size) {
        return Err(ConfigError::InvalidConfiguration {
            message: format!(
                "pool.max_size must be between {} and {}, got {}",
                MIN_POOL_SIZE, MAX_POOL_SIZE, config.pool.max_size
            ),
        });
    }

    if config.buffer.eviction_capacity_bytes == 0 {
        return Err(ConfigError::InvalidConfiguration {
            message: "buffer.eviction_capacity_bytes must be greater than 0".to_string(),
        });
    }

    if config.buffer.replay_capacity_bytes == 0 {
        return Err(ConfigError::InvalidConfiguration {
            message: "buffer.replay_capacity_bytes must be greater than 0".to_string(),
        });
    }

    if config.daemon.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfiguration {
            message: "daemon.request_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.agent.command.trim().is_empty() {
        return Err(ConfigError::InvalidConfiguration {
            message: "agent.command cannot be empty".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&TermhiveConfig::default()).is_ok());
    }

    #[test]
    fn test_pool_size_out_of_range() {
        let mut config = TermhiveConfig::default();
        config.pool.max_size = 1;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidConfiguration { .. })
        ));

        config.pool.max_size = 21;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("pool.max_size"));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let mut config = TermhiveConfig::default();
        config.buffer.eviction_capacity_bytes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_agent_command_rejected() {
        let mut config = TermhiveConfig::default();
        config.agent.command = "   ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("agent.command"));
    }
}
