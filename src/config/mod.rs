//! Configuration management for Songbox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use songbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `SONGBOX__<section>__<key>`
//!
//! Examples:
//! - `SONGBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `SONGBOX__MEDIA__YTDLP_BIN=/usr/local/bin/yt-dlp`
//! - `SONGBOX__LIBRARY__MEDIA_DIR=/srv/music`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/songbox.toml`.
//! This can be overridden using the `SONGBOX_CONFIG` environment variable.

mod models;
mod sources;

pub use models::{Config, LibraryConfig, MediaConfig, ServerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`SONGBOX__*`)
    /// 2. TOML file (default: `config/songbox.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.media.default_quality_kbps == 0 {
            return Err(ConfigError::ValidationError(
                "media.default_quality_kbps must be non-zero".to_string(),
            ));
        }
        if self.server.max_request_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_request_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
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

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[media]
default_quality_kbps = 256
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.media.default_quality_kbps, 256);
    }

    #[test]
    fn test_validation_rejects_zero_quality() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[media]
default_quality_kbps = 0
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
max_request_bytes = 131072

[media]
ytdlp_bin = "/opt/yt-dlp/yt-dlp"
scratch_dir = "/var/tmp/songbox"
default_quality_kbps = 192

[library]
media_dir = "/srv/music/media"
covers_dir = "/srv/music/covers"
catalog_path = "/srv/music/catalog.jsonl"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.max_request_bytes, 131072);
        assert_eq!(
            config.media.ytdlp_bin.to_str().unwrap(),
            "/opt/yt-dlp/yt-dlp"
        );
        assert_eq!(config.library.media_dir.to_str().unwrap(), "/srv/music/media");
        assert_eq!(
            config.library.catalog_path.to_str().unwrap(),
            "/srv/music/catalog.jsonl"
        );
    }
}
