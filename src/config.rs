//! Configuration management for threadkeep
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{Result, ThreadkeepError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for threadkeep
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Session store settings
    #[serde(default)]
    pub store: StoreConfig,
    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Dispatcher settings
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

/// Storage backend configuration
///
/// The database is tried first; the JSON file is the fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path; `None` disables the database variant
    #[serde(default = "default_database_path")]
    pub database_path: Option<PathBuf>,

    /// JSON document used by the file variant
    #[serde(default = "default_file_path")]
    pub file_path: PathBuf,

    /// Connection probe and busy timeout (milliseconds)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("io", "threadkeep", "threadkeep")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".threadkeep"))
}

fn default_database_path() -> Option<PathBuf> {
    Some(data_dir().join("sessions.db"))
}

fn default_file_path() -> PathBuf {
    data_dir().join("chat_sessions.json")
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            file_path: default_file_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of sessions held in memory per owner
    #[serde(default = "default_working_set_limit")]
    pub working_set_limit: usize,
}

fn default_working_set_limit() -> usize {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            working_set_limit: default_working_set_limit(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached replies
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Number of prior messages handed to the reply generator
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_history_window() -> usize {
    6
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ThreadkeepError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| ThreadkeepError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(path) = std::env::var("THREADKEEP_DATABASE_PATH") {
            self.storage.database_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }

        if let Ok(path) = std::env::var("THREADKEEP_FILE_PATH") {
            self.storage.file_path = PathBuf::from(path);
        }

        if let Ok(timeout) = std::env::var("THREADKEEP_CONNECT_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse() {
                self.storage.connect_timeout_ms = value;
            } else {
                tracing::warn!("Invalid THREADKEEP_CONNECT_TIMEOUT_MS: {}", timeout);
            }
        }

        if let Ok(limit) = std::env::var("THREADKEEP_WORKING_SET_LIMIT") {
            if let Ok(value) = limit.parse() {
                self.store.working_set_limit = value;
            } else {
                tracing::warn!("Invalid THREADKEEP_WORKING_SET_LIMIT: {}", limit);
            }
        }

        if let Ok(capacity) = std::env::var("THREADKEEP_CACHE_CAPACITY") {
            if let Ok(value) = capacity.parse() {
                self.cache.capacity = value;
            } else {
                tracing::warn!("Invalid THREADKEEP_CACHE_CAPACITY: {}", capacity);
            }
        }

        if let Ok(window) = std::env::var("THREADKEEP_HISTORY_WINDOW") {
            if let Ok(value) = window.parse() {
                self.dispatcher.history_window = value;
            } else {
                tracing::warn!("Invalid THREADKEEP_HISTORY_WINDOW: {}", window);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.database {
            self.storage.database_path = Some(path.clone());
        }
        if cli.no_database {
            self.storage.database_path = None;
        }
        if let Some(path) = &cli.file {
            self.storage.file_path = path.clone();
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.storage.file_path.as_os_str().is_empty() {
            return Err(
                ThreadkeepError::Config("storage.file_path cannot be empty".to_string()).into(),
            );
        }

        if self.storage.connect_timeout_ms == 0 {
            return Err(ThreadkeepError::Config(
                "storage.connect_timeout_ms must be greater than 0".to_string(),
            )
            .into());
        }

        if self.store.working_set_limit == 0 {
            return Err(ThreadkeepError::Config(
                "store.working_set_limit must be greater than 0".to_string(),
            )
            .into());
        }

        if self.cache.capacity == 0 {
            return Err(
                ThreadkeepError::Config("cache.capacity must be greater than 0".to_string()).into(),
            );
        }

        if self.dispatcher.history_window == 0 {
            return Err(ThreadkeepError::Config(
                "dispatcher.history_window must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
