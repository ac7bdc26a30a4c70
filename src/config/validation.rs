use crate::config::types::{Config, SchedulerConfig, TransportConfig};
use crate::ConfigError;
use reqwest::header::{HeaderName, HeaderValue};

/// Upper bound on simultaneous requests
const MAX_SLOTS_LIMIT: u32 = 64;

/// Upper bound on the cooldown pause (one hour, in milliseconds)
const MAX_SLEEP_FOR: u64 = 3_600_000;

/// Upper bound on the per-task retry budget
const MAX_RETRIES_LIMIT: u32 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_scheduler_config(&config.scheduler)?;
    validate_transport_config(&config.transport)?;
    Ok(())
}

/// Validates scheduler configuration
fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.max_slots < 1 || config.max_slots > MAX_SLOTS_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max-slots must be between 1 and {}, got {}",
            MAX_SLOTS_LIMIT, config.max_slots
        )));
    }

    // sleep-every <= 0 disables cooldown, so any value is fine

    if config.sleep_for > MAX_SLEEP_FOR {
        return Err(ConfigError::Validation(format!(
            "sleep-for must be <= {}ms, got {}ms",
            MAX_SLEEP_FOR, config.sleep_for
        )));
    }

    if config.max_retries > MAX_RETRIES_LIMIT {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= {}, got {}",
            MAX_RETRIES_LIMIT, config.max_retries
        )));
    }

    Ok(())
}

/// Validates transport configuration
fn validate_transport_config(config: &TransportConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    HeaderValue::from_str(&config.user_agent).map_err(|_| {
        ConfigError::InvalidHeader(format!("user-agent '{}'", config.user_agent))
    })?;

    if config.timeout == 0 {
        return Err(ConfigError::Validation("timeout must be > 0ms".to_string()));
    }

    if config.connect_timeout == 0 {
        return Err(ConfigError::Validation(
            "connect-timeout must be > 0ms".to_string(),
        ));
    }

    for (name, value) in &config.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeader(format!("name '{}'", name)))?;
        HeaderValue::from_str(value)
            .map_err(|_| ConfigError::InvalidHeader(format!("value for '{}'", name)))?;
    }

    Ok(())
}
