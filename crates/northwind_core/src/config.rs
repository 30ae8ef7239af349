//! Runtime configuration for hosts embedding the Northwind core.
//!
//! # Responsibility
//! - Resolve database location and logging settings from the environment or
//!   a JSON document.
//!
//! # Invariants
//! - Blank environment values fall back to defaults.
//! - `log_level` is always one of `trace|debug|info|warn|error`.

use crate::db::DbResult;
use crate::logging::{
    default_log_level, init_logging, normalize_level, LoggingError, LoggingSettings,
};
use crate::repo::northwind_repo::NorthwindRepository;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "NORTHWIND_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "NORTHWIND_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "NORTHWIND_LOG_DIR";

const DEFAULT_DB_FILE_NAME: &str = "northwind.sqlite3";

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    InvalidJson(serde_json::Error),
    InvalidLogLevel(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(err) => write!(f, "invalid configuration document: {err}"),
            Self::InvalidLogLevel(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidJson(err) => Some(err),
            Self::InvalidLogLevel(_) => None,
        }
    }
}

/// Database and logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NorthwindConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// Rolling log directory; file logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for NorthwindConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl NorthwindConfig {
    /// Reads `NORTHWIND_DB_PATH`, `NORTHWIND_LOG_LEVEL` and `NORTHWIND_LOG_DIR`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from any key lookup, e.g. a test map.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.log_dir = read(ENV_LOG_DIR).map(PathBuf::from);
        config.validated()
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::InvalidJson)?;
        config.validated()
    }

    /// Opens a repository over the configured database file.
    pub fn open_repository(&self) -> DbResult<NorthwindRepository> {
        NorthwindRepository::open(&self.db_path)
    }

    /// File logging settings; `None` when no log directory is configured.
    pub fn logging_settings(&self) -> Result<Option<LoggingSettings>, LoggingError> {
        self.log_dir
            .as_deref()
            .map(|dir| LoggingSettings::new(&self.log_level, dir))
            .transpose()
    }

    /// Starts file logging when a log directory is configured.
    pub fn init_logging(&self) -> Result<(), LoggingError> {
        match self.logging_settings()? {
            Some(settings) => init_logging(&settings),
            None => Ok(()),
        }
    }

    fn validated(mut self) -> Result<Self, ConfigError> {
        self.log_level = normalize_level(&self.log_level)
            .map_err(|err| ConfigError::InvalidLogLevel(err.to_string()))?
            .to_string();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, NorthwindConfig, ENV_DB_PATH, ENV_LOG_DIR, ENV_LOG_LEVEL};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_blank() {
        let config = NorthwindConfig::from_lookup(lookup(&[(ENV_DB_PATH, "  ")])).unwrap();
        assert_eq!(config, NorthwindConfig::default());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn environment_overrides_defaults_and_normalizes_level() {
        let config = NorthwindConfig::from_lookup(lookup(&[
            (ENV_DB_PATH, "/var/lib/northwind.db"),
            (ENV_LOG_LEVEL, " WARNING "),
            (ENV_LOG_DIR, "/var/log/northwind"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/northwind.db"));
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/northwind")));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = NorthwindConfig::from_json(r#"{ "log_level": "verbose" }"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel(_)));
    }

    #[test]
    fn logging_settings_follow_log_dir() {
        let config = NorthwindConfig::from_lookup(lookup(&[(ENV_LOG_LEVEL, "error")])).unwrap();
        assert_eq!(config.logging_settings().unwrap(), None);

        let config = NorthwindConfig::from_lookup(lookup(&[
            (ENV_LOG_LEVEL, "error"),
            (ENV_LOG_DIR, "/var/log/northwind"),
        ]))
        .unwrap();
        let settings = config.logging_settings().unwrap().unwrap();
        assert_eq!(settings.level, "error");
        assert_eq!(settings.log_dir, PathBuf::from("/var/log/northwind"));

        let relative = NorthwindConfig {
            log_dir: Some(PathBuf::from("logs")),
            ..NorthwindConfig::default()
        };
        assert!(relative.logging_settings().is_err());
    }

    #[test]
    fn json_document_fills_missing_fields_with_defaults() {
        let config = NorthwindConfig::from_json(r#"{ "db_path": "/tmp/nw.db" }"#).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/nw.db"));
        assert_eq!(config.log_level, NorthwindConfig::default().log_level);
    }
}
