use super::{types::Config, ConfigError};

/// Placeholder substituted with the resource id in `queue.status_path`.
pub const RESOURCE_ID_PLACEHOLDER: &str = "{resource_id}";

/// Validate configuration
/// Currently validates:
/// - API base URL and push URL are present, push URL uses ws:// or wss://
/// - Push connect timeout is non-zero
/// - Status path contains the resource id placeholder
/// - Watcher intervals are non-zero and the initial retry does not exceed the cap
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.api.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "api.base_url cannot be empty".to_string(),
        ));
    }

    if !config.push.url.starts_with("ws://") && !config.push.url.starts_with("wss://") {
        return Err(ConfigError::ValidationError(format!(
            "push.url must start with ws:// or wss://, got {:?}",
            config.push.url
        )));
    }

    if config.push.resource_param.is_empty() {
        return Err(ConfigError::ValidationError(
            "push.resource_param cannot be empty".to_string(),
        ));
    }

    if config.push.connect_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "push.connect_timeout_ms cannot be 0".to_string(),
        ));
    }

    if !config.queue.status_path.contains(RESOURCE_ID_PLACEHOLDER) {
        return Err(ConfigError::ValidationError(format!(
            "queue.status_path must contain {}",
            RESOURCE_ID_PLACEHOLDER
        )));
    }

    let watcher = &config.watcher;
    if watcher.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "watcher.poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if watcher.initial_retry_delay_ms == 0 || watcher.synced_retry_delay_ms == 0 {
        return Err(ConfigError::ValidationError(
            "watcher retry delays cannot be 0".to_string(),
        ));
    }
    if watcher.initial_retry_delay_ms > watcher.max_retry_delay_ms {
        return Err(ConfigError::ValidationError(format!(
            "watcher.initial_retry_delay_ms ({}) exceeds watcher.max_retry_delay_ms ({})",
            watcher.initial_retry_delay_ms, watcher.max_retry_delay_ms
        )));
    }

    Ok(())
}
