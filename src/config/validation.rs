//! Configuration validation
//!
//! Validates the server configuration before anything is opened:
//! - A store connection string is present
//! - Store calls have a non-zero time bound
//! - The body limit is usable
//! - The host parses as an address or hostname

use super::server_config::ServerConfig;
use crate::CatalogError;
use std::net::IpAddr;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a server configuration, collecting every problem
pub fn validate_config(config: &ServerConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.database_url.trim().is_empty() {
        errors.push(ValidationError::new(
            "database_url",
            "A store connection string is required",
        ));
    }

    if config.cache.store_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "cache.store_timeout_ms",
            "Store timeout must be greater than 0",
        ));
    }

    if config.cache.ttl_ms == 0 {
        tracing::warn!("cache.ttl_ms is 0; every read will go to the store");
    }

    if config.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "max_body_bytes",
            "Body limit must be greater than 0",
        ));
    }

    if !is_valid_host(&config.host) {
        errors.push(ValidationError::new(
            "host",
            format!("Invalid host '{}'", config.host),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// IP literal or RFC 1123 hostname
fn is_valid_host(host: &str) -> bool {
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }

    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Validate configuration and return a Result
pub fn validate_config_result(config: &ServerConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        CatalogError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
