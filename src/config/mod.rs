//! Configuration system
//!
//! Loads the catalog server configuration from an optional YAML file, then
//! applies environment/command-line overrides on top:
//! - Store connection string
//! - Listening address and port
//! - Cache TTL and store timeout
//! - Request body limit and CORS

mod server_config;
pub mod validation;

pub use server_config::{CacheSettings, ConfigOverrides, ServerConfig};
pub use validation::{validate_config, validate_config_result, ValidationError};
