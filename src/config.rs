//! Configuration system for aviary.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **Config file** - `~/.config/aviary/config.toml`
//! 3. **Environment variables** - `AVIARY_*` prefix
//!
//! # Example Configuration File
//!
//! ```toml
//! [paths]
//! db = "/var/lib/aviary/aviary.db"
//!
//! [feed]
//! default_limit = 20
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Main configuration structure for the feed core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Feed behavior configuration.
    pub feed: FeedConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Path configuration for the database location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `AVIARY_DB`
    pub db: Option<PathBuf>,
}

/// Feed behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Default page size when the caller does not pass one.
    /// Environment variable: `AVIARY_LIMIT`
    pub default_limit: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum log level: error, warn, info, debug, trace, off.
    /// Environment variable: `AVIARY_LOG`
    pub level: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { default_limit: 20 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration with full layering: defaults, then the config
    /// file, then environment variables.
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::load_file().unwrap_or_default();
        config.apply_env();
        config
    }

    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("aviary").join("config.toml"))
    }

    /// Default location of the database file.
    #[must_use]
    pub fn default_db_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aviary")
            .join(crate::DEFAULT_DB_NAME)
    }

    /// The configured database path, or the default location.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(Self::default_db_path)
    }

    fn load_file() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            debug!("No config file at {}", path.display());
            return None;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Invalid config file {}: {e}", path.display());
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                None
            }
        }
    }

    /// Apply `AVIARY_*` environment variable overrides.
    fn apply_env(&mut self) {
        if let Ok(db) = std::env::var("AVIARY_DB") {
            if !db.is_empty() {
                self.paths.db = Some(PathBuf::from(db));
            }
        }

        if let Ok(limit) = std::env::var("AVIARY_LIMIT") {
            match limit.parse() {
                Ok(value) => self.feed.default_limit = value,
                Err(_) => warn!("Ignoring invalid AVIARY_LIMIT value '{limit}'"),
            }
        }

        if let Ok(level) = std::env::var("AVIARY_LOG") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Parse a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.feed.default_limit, 20);
        assert_eq!(config.logging.level, "info");
        assert!(config.paths.db.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml("[feed]\ndefault_limit = 50\n").unwrap();
        assert_eq!(config.feed.default_limit, 50);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn full_toml_round_trips() {
        let config = Config::from_toml(
            r#"
            [paths]
            db = "/tmp/aviary.db"

            [feed]
            default_limit = 10

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.paths.db, Some(PathBuf::from("/tmp/aviary.db")));
        assert_eq!(config.feed.default_limit, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::from_toml("feed = nonsense").is_err());
    }

    #[test]
    fn db_path_falls_back_to_default() {
        let config = Config::default();
        assert!(config.db_path().ends_with("aviary/aviary.db"));

        let configured = Config {
            paths: PathsConfig {
                db: Some(PathBuf::from("/custom/db.sqlite")),
            },
            ..Config::default()
        };
        assert_eq!(configured.db_path(), PathBuf::from("/custom/db.sqlite"));
    }
}
