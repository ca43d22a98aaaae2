//! Control layer configuration.
//!
//! Settings come from a TOML file, from environment variables, or from code.
//! `ControlConfig::default()` takes its log level from the process-wide
//! [`default_log_level`](crate::diagnostics::default_log_level), which is
//! initialised from `OSI2_LOG_LEVEL`. Every other setting is read from the
//! environment only by [`ControlConfig::from_env`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostics::{self, LogLevel};

/// Environment variable names.
pub mod env_vars {
    /// Default plugin directory of a control instance.
    pub const PLUGIN_DIR: &str = "OSI2_PLUGIN_DIR";
    /// Process-wide default log level (name or number).
    pub const LOG_LEVEL: &str = "OSI2_LOG_LEVEL";
    /// Default plugin directory of the native plugin manager.
    pub const MANAGER_PLUGIN_DIR: &str = "OSI2_MANAGER_PLUGIN_DIR";
    /// Emit JSON logs from the CLI.
    pub const LOG_JSON: &str = "OSI2_LOG_JSON";
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid log level: {0:?}")]
    InvalidLogLevel(String),
}

/// Settings for one [`Control`](crate::Control).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Directory tried before the manager's default when a load names none.
    pub default_plugin_dir: Option<PathBuf>,
    /// Diagnostic threshold, fixed when the control is constructed.
    pub log_level: LogLevel,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            default_plugin_dir: None,
            log_level: diagnostics::default_log_level(),
        }
    }
}

impl ControlConfig {
    /// Build from `OSI2_PLUGIN_DIR` and `OSI2_LOG_LEVEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = std::env::var_os(env_vars::PLUGIN_DIR).filter(|v| !v.is_empty()) {
            config.default_plugin_dir = Some(PathBuf::from(dir));
        }
        if let Ok(level) = std::env::var(env_vars::LOG_LEVEL) {
            config.log_level = level.parse()?;
        }
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn with_default_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_plugin_dir = Some(dir.into());
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_toml_str() {
        let config = ControlConfig::from_toml_str(
            r#"
            default_plugin_dir = "/opt/osi2/plugins"
            log_level = "warnings"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.default_plugin_dir,
            Some(PathBuf::from("/opt/osi2/plugins"))
        );
        assert_eq!(config.log_level, LogLevel::Warnings);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = ControlConfig::from_toml_str("").unwrap();
        assert!(config.default_plugin_dir.is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let result = ControlConfig::from_toml_str("log_level = \"shouting\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_toml_log_level_accepts_env_spellings() {
        let config = ControlConfig::from_toml_str("log_level = \"warn\"").unwrap();
        assert_eq!(config.log_level, LogLevel::Warnings);

        let config = ControlConfig::from_toml_str("log_level = \"3\"").unwrap();
        assert_eq!(config.log_level, LogLevel::Info);

        let config = ControlConfig::from_toml_str("log_level = \"Debug\"").unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();

        let config = ControlConfig::load(file.path()).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ControlConfig::load("/nonexistent/osi2/control.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_builders() {
        let config = ControlConfig::default()
            .with_default_plugin_dir("plugins")
            .with_log_level(LogLevel::Quiet);
        assert_eq!(config.default_plugin_dir, Some(PathBuf::from("plugins")));
        assert_eq!(config.log_level, LogLevel::Quiet);
    }
}
