//! Test utilities for threadkeep
//!
//! This module provides common test utilities including temporary directory
//! management, storage configurations, and assertion helpers.

use crate::config::Config;
use std::path::Path;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Configuration whose database and file both live under `dir`
pub fn database_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.database_path = Some(dir.join("sessions.db"));
    config.storage.file_path = dir.join("chat_sessions.json");
    config.storage.connect_timeout_ms = 500;
    config
}

/// Configuration with the database disabled, so the file backend is used
pub fn file_config(dir: &Path) -> Config {
    let mut config = database_config(dir);
    config.storage.database_path = None;
    config
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: anyhow::Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
storage:
  database_path: null
  file_path: /tmp/threadkeep-test/chat_sessions.json
  connect_timeout_ms: 250
store:
  working_set_limit: 4
cache:
  capacity: 8
dispatcher:
  history_window: 2
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ThreadkeepError;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_configs_point_into_dir() {
        let dir = temp_dir();
        let config = database_config(dir.path());
        assert!(config.storage.database_path.unwrap().starts_with(dir.path()));
        assert!(file_config(dir.path()).storage.database_path.is_none());
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: anyhow::Result<()> =
            Err(ThreadkeepError::Config("test error message".to_string()).into());
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        assert_error_contains(Ok(()), "error");
    }

    #[test]
    fn test_test_config_yaml() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert!(config.storage.database_path.is_none());
        assert_eq!(config.store.working_set_limit, 4);
        assert_eq!(config.dispatcher.history_window, 2);
        assert!(config.validate().is_ok());
    }
}
