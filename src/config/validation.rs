use crate::config::types::{
    CollectionConfig, Config, OutputConfig, RateLimitConfig, StorageConfig, TabConfig,
    UserAgentConfig,
};
use crate::model::validate_queue;
use crate::ConfigError;
use url::Url;

/// Upper bound for the persisted log ring
const MAX_LOG_CAPACITY: usize = 10_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_collection_config(&config.collection)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_tab_config(&config.tab)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_output_config(&config.output)?;
    validate_targets(config)?;
    Ok(())
}

/// Validates collection settings
fn validate_collection_config(config: &CollectionConfig) -> Result<(), ConfigError> {
    if config.items_per_target < 1 {
        return Err(ConfigError::Validation(format!(
            "items_per_target must be >= 1, got {}",
            config.items_per_target
        )));
    }

    Ok(())
}

/// Validates pacing ranges
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.short_delay_min_ms > config.short_delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "short_delay_min_ms ({}) must not exceed short_delay_max_ms ({})",
            config.short_delay_min_ms, config.short_delay_max_ms
        )));
    }

    if config.cooldown_min_ms > config.cooldown_max_ms {
        return Err(ConfigError::Validation(format!(
            "cooldown_min_ms ({}) must not exceed cooldown_max_ms ({})",
            config.cooldown_min_ms, config.cooldown_max_ms
        )));
    }

    Ok(())
}

/// Validates tab timing
fn validate_tab_config(config: &TabConfig) -> Result<(), ConfigError> {
    if config.load_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "load_timeout_ms must be >= 100ms, got {}ms",
            config.load_timeout_ms
        )));
    }

    if config.extraction_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "extraction_timeout_ms must be >= 100ms, got {}ms",
            config.extraction_timeout_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Name: non-empty, alphanumeric + hyphens only
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "user agent name cannot be empty".to_string(),
        ));
    }

    if !config.name.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(ConfigError::Validation(format!(
            "user agent name must contain only alphanumeric characters and hyphens, got '{}'",
            config.name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.log_capacity < 1 || config.log_capacity > MAX_LOG_CAPACITY {
        return Err(ConfigError::Validation(format!(
            "log_capacity must be between 1 and {}, got {}",
            MAX_LOG_CAPACITY, config.log_capacity
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.csv_path.is_empty() {
        return Err(ConfigError::Validation("csv_path cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates the target list: resolvable entries, unique ids, http(s) URLs
fn validate_targets(config: &Config) -> Result<(), ConfigError> {
    let targets = config.targets()?;
    validate_queue(&targets)?;
    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Must contain a single @ with text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
