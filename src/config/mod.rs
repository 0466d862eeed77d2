//! Configuration management for mediagrab
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Usage
//!
//! ```no_run
//! use mediagrab::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Health endpoint on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Any key can be overridden with `MEDIAGRAB__<section>__<key>`:
//! - `MEDIAGRAB__DISPATCHER__MAX_CONCURRENT=5`
//! - `MEDIAGRAB__SELECTION__TTL_SECS=900`
//! - `MEDIAGRAB__DELIVERY__MAX_UPLOAD_BYTES=50MB`
//!
//! The bot token is read from `BOT_TOKEN` (a `.env` file is honoured).
//!
//! # Configuration File
//!
//! By default the file is `config/mediagrab.toml`; `MEDIAGRAB_CONFIG`
//! points elsewhere.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{
    BotConfig, Config, DeliveryConfig, DispatcherConfig, ResolverConfig, SelectionConfig,
    ServerConfig, StoreConfig,
};
pub use validation::{MAX_INFO_RETRIES, MAX_VIDEO_VARIANTS, ValidationError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("Bot token missing: set BOT_TOKEN or MEDIAGRAB__BOT__TOKEN")]
    MissingToken,
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// # Errors
    ///
    /// Returns an error if the file is malformed or validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// The bot token, required only when actually connecting
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.bot
            .token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[dispatcher]\nmax_concurrent = 2\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.dispatcher.max_concurrent, 2);
        assert_eq!(config.selection.ttl_secs, 1800);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[selection]\nmax_entries = 0\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::ZeroCacheCapacity)
        ));
    }

    #[test]
    fn test_require_token() {
        let mut config = Config::default();
        assert!(matches!(
            config.require_token(),
            Err(ConfigError::MissingToken)
        ));

        config.bot.token = Some("123:abc".to_string());
        assert_eq!(config.require_token().unwrap(), "123:abc");
    }
}
