//! Engine configuration
//!
//! Handles configuration from environment variables and TOML files,
//! with defaults suitable for tests and local development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding the storage engine's files
    pub directory: PathBuf,

    /// Budget for the engine's parsed-query cache, in megabytes
    pub cache_size_mb: u64,

    /// Maximum number of concurrent calls into the storage engine
    pub pool_size: usize,

    /// Create predicates on the fly for mutations that reference unknown ones
    pub auto_schema: bool,

    /// Tracing filter directive for binaries that install a subscriber
    pub log_filter: Option<String>,

    /// Caller-supplied subscriber receiving lifecycle events
    #[serde(skip)]
    pub logger: Option<tracing::Dispatch>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./recgraph-data"),
            cache_size_mb: 64,
            pool_size: 16,
            auto_schema: true,
            log_filter: None,
            logger: None,
        }
    }
}

impl EngineConfig {
    /// Configuration rooted at the given directory, defaults elsewhere
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Set the query cache budget
    pub fn with_cache_size_mb(mut self, mb: u64) -> Self {
        self.cache_size_mb = mb;
        self
    }

    /// Set the engine call pool size
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Enable or disable automatic predicate creation
    pub fn with_auto_schema(mut self, enabled: bool) -> Self {
        self.auto_schema = enabled;
        self
    }

    /// Route lifecycle events to a specific subscriber
    pub fn with_logger(mut self, dispatch: tracing::Dispatch) -> Self {
        self.logger = Some(dispatch);
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RECGRAPH_DIR") {
            config.directory = PathBuf::from(dir);
        }
        if let Ok(size) = std::env::var("RECGRAPH_CACHE_SIZE_MB") {
            config.cache_size_mb = size.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RECGRAPH_CACHE_SIZE_MB".to_string(),
                value: size,
            })?;
        }
        if let Ok(size) = std::env::var("RECGRAPH_POOL_SIZE") {
            config.pool_size = size.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RECGRAPH_POOL_SIZE".to_string(),
                value: size,
            })?;
        }
        if let Ok(flag) = std::env::var("RECGRAPH_AUTO_SCHEMA") {
            config.auto_schema = parse_bool(&flag).ok_or(ConfigError::InvalidValue {
                key: "RECGRAPH_AUTO_SCHEMA".to_string(),
                value: flag,
            })?;
        }
        if let Ok(filter) = std::env::var("RECGRAPH_LOG") {
            config.log_filter = Some(filter).filter(|f| !f.trim().is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would make the engine unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("directory".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pool_size".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_size, 16);
        assert!(config.auto_schema);
        assert!(config.logger.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::new("/tmp/graph")
            .with_pool_size(4)
            .with_cache_size_mb(8)
            .with_auto_schema(false);
        assert_eq!(config.directory, PathBuf::from("/tmp/graph"));
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.cache_size_mb, 8);
        assert!(!config.auto_schema);
    }

    #[test]
    fn test_zero_pool_rejected() {
        let config = EngineConfig::default().with_pool_size(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_toml() {
        let config: EngineConfig =
            toml::from_str("directory = \"/data/graph\"\npool_size = 2\n").unwrap();
        assert_eq!(config.directory, PathBuf::from("/data/graph"));
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.cache_size_mb, 64);
        assert!(config.log_filter.is_none());

        let config: EngineConfig = toml::from_str("log_filter = \"recgraph=debug\"\n").unwrap();
        assert_eq!(config.log_filter.as_deref(), Some("recgraph=debug"));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
