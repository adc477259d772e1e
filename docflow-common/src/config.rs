//! Bootstrap configuration loading
//!
//! The worker is configured from a small TOML file. Every field has a
//! built-in default, so a missing file is not an error. Resolution of the
//! file location follows this priority order:
//! 1. Explicit path (command-line argument)
//! 2. `DOCFLOW_CONFIG` environment variable
//! 3. `~/.config/docflow/docflow.toml`
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "DOCFLOW_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Path to the SQLite database holding tasks and analyses
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Worker pool configuration
    #[serde(default)]
    pub worker: WorkerSection,

    /// AI provider configuration
    #[serde(default)]
    pub ai: AiSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// `[worker]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkerSection {
    /// Maximum simultaneous task executions
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Idle poll interval when every queue is empty
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// Grace period for in-flight tasks on shutdown
    #[serde(default)]
    pub shutdown_timeout_secs: Option<u64>,
}

/// `[ai]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AiSection {
    /// Base URL of the enrichment service
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bearer token for the enrichment service
    #[serde(default)]
    pub api_key: Option<String>,

    /// Client-side request rate limit
    #[serde(default)]
    pub requests_per_second: Option<u32>,

    /// Per-request timeout
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file location and load it
    ///
    /// An explicitly requested file (argument or environment) must exist.
    /// The per-user default location is optional.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return Self::load(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Self::load(Path::new(&path));
            }
        }

        // Priority 3: Per-user config directory
        if let Some(path) = default_config_path() {
            if path.exists() {
                return Self::load(&path);
            }
            debug!("No config file at {}, using defaults", path.display());
        }

        // Priority 4: Built-in defaults
        Ok(Self::default())
    }
}

/// Default per-user config file path (`~/.config/docflow/docflow.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docflow").join("docflow.toml"))
}

/// Default database location (`~/.local/share/docflow/docflow.db` on Linux)
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("docflow"))
        .unwrap_or_else(|| PathBuf::from("./docflow_data"))
        .join("docflow.db")
}

/// Serialize and write a configuration file, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.worker.concurrency.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let config = TomlConfig::from_toml_str(
            r#"
            database_path = "/var/lib/docflow/docflow.db"

            [logging]
            level = "debug"

            [worker]
            concurrency = 4
            poll_interval_ms = 250
            shutdown_timeout_secs = 10

            [ai]
            base_url = "http://localhost:8080"
            api_key = "secret"
            requests_per_second = 5
            "#,
        )
        .unwrap();

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/docflow/docflow.db"))
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.worker.concurrency, Some(4));
        assert_eq!(config.worker.poll_interval_ms, Some(250));
        assert_eq!(config.worker.shutdown_timeout_secs, Some(10));
        assert_eq!(config.ai.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.ai.requests_per_second, Some(5));
        assert!(config.ai.request_timeout_secs.is_none());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("[worker\nconcurrency = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_write_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("docflow.toml");

        let mut config = TomlConfig::default();
        config.worker.concurrency = Some(3);
        config.ai.api_key = Some("k".to_string());

        write_toml_config(&config, &path).unwrap();
        let loaded = TomlConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    #[serial]
    fn test_resolve_prefers_cli_over_env() {
        let temp_dir = TempDir::new().unwrap();
        let cli_path = temp_dir.path().join("cli.toml");
        let env_path = temp_dir.path().join("env.toml");
        std::fs::write(&cli_path, "[worker]\nconcurrency = 1\n").unwrap();
        std::fs::write(&env_path, "[worker]\nconcurrency = 2\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &env_path);
        let from_cli = TomlConfig::resolve(Some(&cli_path)).unwrap();
        let from_env = TomlConfig::resolve(None).unwrap();
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(from_cli.worker.concurrency, Some(1));
        assert_eq!(from_env.worker.concurrency, Some(2));
    }

    #[test]
    #[serial]
    fn test_resolve_missing_explicit_file_fails() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let err = TomlConfig::resolve(Some(Path::new("/nonexistent/docflow.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
