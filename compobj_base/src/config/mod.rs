//! Configuration module
//!
//! Every setting has an environment default (`COMPOBJ_*`). A TOML file named
//! by `COMPOBJ_CONFIG` overrides the sections it defines.

pub mod runtime;

pub use runtime::{
    CollectorPreferences, EnginePreferences, LoggingPreferences, RuntimeConfig, SystemPaths,
};

use crate::logging::{LogFormat, LogLevel};
use std::path::Path;
use std::time::Duration;

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value '{value}' for {setting}")]
    InvalidValue { setting: &'static str, value: String },
}

impl RuntimeConfig {
    /// Load from the environment, then apply the `COMPOBJ_CONFIG` file if set
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var("COMPOBJ_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    /// Parse a TOML file; sections it omits keep their environment defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        LogLevel::parse(&self.logging.level).ok_or_else(|| ConfigError::InvalidValue {
            setting: "logging.level",
            value: self.logging.level.clone(),
        })
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        LogFormat::parse(&self.logging.format).ok_or_else(|| ConfigError::InvalidValue {
            setting: "logging.format",
            value: self.logging.format.clone(),
        })
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.engine
            .command_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_toml_overlay() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [engine]
            legacy_result_algebra = true
            command_timeout_secs = 30
            backup_dir = "/srv/backup"

            [paths]
            passwd = "/tmp/passwd"
            "#,
        )
        .unwrap();

        assert!(config.engine.legacy_result_algebra);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.engine.backup_dir, PathBuf::from("/srv/backup"));
        assert_eq!(config.paths.passwd, PathBuf::from("/tmp/passwd"));
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let mut config = RuntimeConfig::default();
        config.engine.command_timeout_secs = Some(0);
        assert_eq!(config.command_timeout(), None);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = RuntimeConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.log_level().is_err());
        config.logging.format = "json".to_string();
        assert_eq!(config.log_format().unwrap(), LogFormat::Json);
    }
}
