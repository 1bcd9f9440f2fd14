use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Exactly one of database.path / database.url, with a supported URL scheme
/// - Queue timing and attempt bounds
/// - Toolkit command and archive sync window are set
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    match (&config.database.path, &config.database.url) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::ValidationError(
                "database.path and database.url are mutually exclusive".to_string(),
            ));
        }
        (None, None) => {
            return Err(ConfigError::ValidationError(
                "one of database.path or database.url is required".to_string(),
            ));
        }
        (None, Some(url)) if config.database.resolved_path().is_none() => {
            return Err(ConfigError::ValidationError(format!(
                "database.url must use sqlite:// or file: scheme, got {}",
                url.split(':').next().unwrap_or_default()
            )));
        }
        _ => {}
    }

    if config.queue.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "queue.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.queue.job_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "queue.job_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.queue.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "queue.max_attempts must be at least 1".to_string(),
        ));
    }

    if config.toolkit.command.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "toolkit.command cannot be empty".to_string(),
        ));
    }

    if config.archive.sync_days == 0 {
        return Err(ConfigError::ValidationError(
            "archive.sync_days must be at least 1".to_string(),
        ));
    }

    Ok(())
}
