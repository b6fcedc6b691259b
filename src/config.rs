//! Configuration management for the Doc Converter server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Per-file upload limit: 10 MiB
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub engines: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory under which per-job workspaces are created
    pub workspace_root: PathBuf,
    /// How long an artifact is kept after registration
    pub retention_secs: u64,
    /// How often the purge task runs
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Timeout for in-process engines (PDF, images)
    pub timeout_secs: u64,
    /// Timeout for the LibreOffice engine
    pub office_timeout_secs: u64,
    /// LibreOffice executable name or path
    pub libreoffice_bin: String,
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }
}

fn default_workspace_root() -> PathBuf {
    env::temp_dir().join("doc-converter")
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            storage: StorageConfig {
                workspace_root: default_workspace_root(),
                retention_secs: 3600,
                purge_interval_secs: 300,
            },
            engines: EngineConfig {
                timeout_secs: 60,
                office_timeout_secs: 300,
                libreoffice_bin: "libreoffice".to_string(),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var("SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                workspace_root: env::var("WORKSPACE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.workspace_root),
                retention_secs: parse_var(
                    "ARTIFACT_RETENTION_SECS",
                    defaults.storage.retention_secs,
                )?,
                purge_interval_secs: parse_var(
                    "PURGE_INTERVAL_SECS",
                    defaults.storage.purge_interval_secs,
                )?,
            },
            engines: EngineConfig {
                timeout_secs: parse_var("ENGINE_TIMEOUT_SECS", defaults.engines.timeout_secs)?,
                office_timeout_secs: parse_var(
                    "OFFICE_TIMEOUT_SECS",
                    defaults.engines.office_timeout_secs,
                )?,
                libreoffice_bin: env::var("LIBREOFFICE_BIN")
                    .unwrap_or(defaults.engines.libreoffice_bin),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.retention(), Duration::from_secs(3600));
        assert_eq!(config.engines.libreoffice_bin, "libreoffice");
    }

    #[test]
    fn test_purge_interval_never_zero() {
        let mut config = Config::default();
        config.storage.purge_interval_secs = 0;
        assert_eq!(config.storage.purge_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let value: u64 = parse_var("DOC_CONVERTER_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }
}
