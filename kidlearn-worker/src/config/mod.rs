//! Configuration module for kidlearn-worker.
//!
//! Handles loading configuration from an optional TOML file, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::{FileConfig, LogFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Values given on the command line (or their environment fallbacks).
/// Each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub redis_url: Option<String>,
    pub channel: Option<String>,
    pub log_level: Option<String>,
}

/// Fully resolved worker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub channel: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    overrides: Overrides,
}

impl ConfigLoader {
    /// Create a new config loader. Without a path, file defaults apply.
    pub fn new(config_path: Option<impl AsRef<Path>>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.map(|p| p.as_ref().to_path_buf()),
            overrides,
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if one was given
    /// 2. Apply CLI overrides
    /// 3. Validate the result
    pub fn load(&self) -> Result<WorkerConfig, ConfigError> {
        let file_config = match &self.config_path {
            Some(path) => {
                let config_content = std::fs::read_to_string(path)?;
                toml::from_str(&config_content)?
            }
            None => FileConfig::default(),
        };
        self.resolve(file_config)
    }

    fn resolve(&self, file_config: FileConfig) -> Result<WorkerConfig, ConfigError> {
        let overrides = self.overrides.clone();
        let config = WorkerConfig {
            redis_url: overrides.redis_url.unwrap_or(file_config.redis.url),
            channel: overrides.channel.unwrap_or(file_config.redis.channel),
            min_connections: file_config.database.min_connections,
            max_connections: file_config.database.max_connections,
            log_level: overrides.log_level.unwrap_or(file_config.logging.level),
            log_format: file_config.logging.format,
        };
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.channel.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "channel must not be empty".to_string(),
        ));
    }
    if config.redis_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "redis url must not be empty".to_string(),
        ));
    }
    if config.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be at least 1".to_string(),
        ));
    }
    if config.min_connections > config.max_connections {
        return Err(ConfigError::ValidationError(format!(
            "database.min_connections ({}) exceeds database.max_connections ({})",
            config.min_connections, config.max_connections
        )));
    }
    Ok(())
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader(overrides: Overrides) -> ConfigLoader {
        ConfigLoader::new(None::<PathBuf>, overrides)
    }

    fn parse(toml_str: &str) -> FileConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn test_defaults_without_file() {
        let config = loader(Overrides::default()).load().unwrap();
        assert_eq!(
            config,
            WorkerConfig {
                redis_url: "redis://localhost:6379".to_string(),
                channel: "learning-events".to_string(),
                min_connections: 1,
                max_connections: 5,
                log_level: "info".to_string(),
                log_format: LogFormat::Text,
            }
        );
    }

    #[test]
    fn test_overrides_win_over_file() {
        let overrides = Overrides {
            redis_url: Some("redis://override:6379".to_string()),
            channel: Some("override-events".to_string()),
            log_level: None,
        };
        let file_config = parse(
            r#"
[redis]
url = "redis://file:6379"
channel = "file-events"

[logging]
level = "debug"
"#,
        );

        let config = loader(overrides).resolve(file_config).unwrap();
        assert_eq!(config.redis_url, "redis://override:6379");
        assert_eq!(config.channel, "override-events");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_empty_channel_is_rejected() {
        let overrides = Overrides {
            channel: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            loader(overrides).load(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_pool_bounds_are_validated() {
        let zero_max = parse("[database]\nmin_connections = 0\nmax_connections = 0\n");
        assert!(matches!(
            loader(Overrides::default()).resolve(zero_max),
            Err(ConfigError::ValidationError(_))
        ));

        let inverted = parse("[database]\nmin_connections = 6\nmax_connections = 2\n");
        assert!(matches!(
            loader(Overrides::default()).resolve(inverted),
            Err(ConfigError::ValidationError(msg)) if msg.contains("min_connections (6)")
        ));
    }

    #[test]
    fn test_load_reads_file() {
        let path = std::env::temp_dir().join(format!(
            "kidlearn-worker-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[redis]\nchannel = \"from-file\"\n").unwrap();

        let result = ConfigLoader::new(Some(&path), Overrides::default()).load();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(result.unwrap().channel, "from-file");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = ConfigLoader::new(
            Some("/nonexistent/kidlearn-worker.toml"),
            Overrides::default(),
        );
        assert!(matches!(loader.load(), Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_missing_database_url_names_the_variable() {
        assert_eq!(
            ConfigError::MissingDatabaseUrl.to_string(),
            "DATABASE_URL environment variable not set"
        );
    }
}
