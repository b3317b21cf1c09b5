use crate::config::types::{Config, FrontierConfig, ServerConfig, StoreConfig};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server_config(&config.server)?;
    validate_frontier_config(&config.frontier)?;
    validate_store_config(&config.store)?;
    Ok(())
}

/// Validates server configuration
fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.host.is_empty() {
        return Err(ConfigError::Validation("host cannot be empty".to_string()));
    }

    if config.port == 0 {
        return Err(ConfigError::Validation(
            "port must be non-zero".to_string(),
        ));
    }

    if config.max_concurrent_streams < 1 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_streams must be >= 1, got {}",
            config.max_concurrent_streams
        )));
    }

    Ok(())
}

/// Validates frontier scheduling configuration
fn validate_frontier_config(config: &FrontierConfig) -> Result<(), ConfigError> {
    // A zero minimum delay is legal: it disables politeness for crawls that
    // have not set their own limit.

    if config.default_delay_requestable_seconds < 1 {
        return Err(ConfigError::Validation(format!(
            "default_delay_requestable_seconds must be >= 1, got {}",
            config.default_delay_requestable_seconds
        )));
    }

    if config.ingest_outstanding_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "ingest_outstanding_limit must be >= 1, got {}",
            config.ingest_outstanding_limit
        )));
    }

    if config.fetch_deadline_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "fetch_deadline_ms must be >= 10ms, got {}ms",
            config.fetch_deadline_ms
        )));
    }

    Ok(())
}

/// Validates store backend configuration
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    match config.backend.as_str() {
        "sqlite" => {
            if config.path.is_empty() {
                return Err(ConfigError::Validation(
                    "store path cannot be empty for the sqlite backend".to_string(),
                ));
            }
            Ok(())
        }
        "memory" => Ok(()),
        other => Err(ConfigError::UnknownBackend(other.to_string())),
    }
}
