//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments / environment variables (applied as [`ConfigOverrides`])
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants)
//!
//! The TOML file is looked up at an explicit path when one is given, otherwise
//! at `<user config dir>/uptrack/config.toml`. A missing default file is not an
//! error; a missing explicit file is.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Bootstrap configuration loaded from TOML
///
/// Cannot change while the service runs; restart to pick up edits.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Interface the HTTP server binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upload record storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Progress notifier settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which backing store holds upload records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local map, lost on restart
    Memory,
    /// SQLite database file
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!(
                "unknown store backend '{}' (expected memory or sqlite)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// SQLite database file, used when `backend = "sqlite"`
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    /// Delay between two snapshots on a subscription, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_database_path() -> PathBuf {
    PathBuf::from("uptrack.db")
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            store: StoreConfig::default(),
            notifier: NotifierConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl NotifierConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when no file exists
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `explicit_path` is given but cannot be read
    /// - the file content is not valid TOML for [`TomlConfig`]
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply command-line / environment overrides on top of file values
    pub fn apply(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(backend) = overrides.store_backend {
            self.store.backend = backend;
        }
        // Naming a database file only makes sense for the SQLite backend
        if let Some(path) = overrides.database_path {
            self.store.database_path = path;
            self.store.backend = StoreBackend::Sqlite;
        }
        if let Some(ms) = overrides.poll_interval_ms {
            self.notifier.poll_interval_ms = ms;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    /// Address string suitable for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.notifier.poll_interval_ms == 0 {
            return Err(Error::Config(
                "notifier.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Command-line configuration overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub store_backend: Option<StoreBackend>,
    pub database_path: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// `<user config dir>/uptrack/config.toml`, if the platform has a config dir
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("uptrack").join("config.toml"))
}
