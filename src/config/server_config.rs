//! Catalog server configuration file handling

use crate::catalog::CatalogConfig;
use crate::storage::StoreConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Duration before a populated snapshot is considered stale
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Upper bound on a single store call
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
}

fn default_ttl_ms() -> u64 {
    3_600_000
}

fn default_store_timeout_ms() -> u64 {
    10_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            store_timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Catalog server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Store connection string (SQLite path or `:memory:`)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cache: CacheSettings,

    /// Maximum accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Allow cross-origin requests from any origin
    #[serde(default = "default_cors")]
    pub cors: bool,
}

fn default_database_url() -> String {
    "institutions.db".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_body_bytes() -> usize {
    100 * 1024
}

fn default_cors() -> bool {
    true
}

/// Values taken from the environment or the command line.
///
/// `None` leaves the file/default value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ttl_ms: Option<u64>,
    pub store_timeout_ms: Option<u64>,
    pub max_body_bytes: Option<usize>,
    pub cors: Option<bool>,
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::CatalogError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading catalog configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            port = config.port,
            ttl_ms = config.cache.ttl_ms,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load from `path` if given, otherwise start from defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to a YAML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving catalog configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Apply overrides on top of the current values
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database_url = database_url;
        }
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(ttl_ms) = overrides.ttl_ms {
            self.cache.ttl_ms = ttl_ms;
        }
        if let Some(store_timeout_ms) = overrides.store_timeout_ms {
            self.cache.store_timeout_ms = store_timeout_ms;
        }
        if let Some(max_body_bytes) = overrides.max_body_bytes {
            self.max_body_bytes = max_body_bytes;
        }
        if let Some(cors) = overrides.cors {
            self.cors = cors;
        }
    }

    /// Address the server binds to
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') {
            // IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            ttl: Duration::from_millis(self.cache.ttl_ms),
            store_timeout: Duration::from_millis(self.cache.store_timeout_ms),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.database_url.clone())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            host: default_host(),
            port: default_port(),
            cache: CacheSettings::default(),
            max_body_bytes: default_max_body_bytes(),
            cors: default_cors(),
        }
    }
}
