//! Storage backends for sessions
//!
//! Two interchangeable variants implement [`StorageBackend`]: an embedded
//! SQLite database ([`SqliteStorage`]) and a single JSON document
//! ([`FileStorage`]). The variant is chosen once, when a store is built, by
//! [`select_backend`]: probe the database first, fall back to the file.

use crate::config::StorageConfig;
use crate::error::{Result, ThreadkeepError};
use crate::session::Session;
use std::time::Duration;

pub mod file;
pub mod sqlite;
pub mod types;

pub use file::FileStorage;
pub use sqlite::SqliteStorage;
pub use types::{BackendKind, SessionSummary};

/// Persistence contract shared by every backend
///
/// Calls are blocking. Faults surface as [`ThreadkeepError::StorageFault`];
/// a missing record is `Ok(None)` / `Ok(false)`, never an error.
pub trait StorageBackend: Send {
    /// Which variant this is
    fn kind(&self) -> BackendKind;

    /// Inserts or replaces the record keyed by the session id
    fn upsert(&self, session: &Session) -> Result<()>;

    /// Loads a full session
    fn fetch(&self, id: &str) -> Result<Option<Session>>;

    /// Removes a record; true iff one existed
    fn delete(&self, id: &str) -> Result<bool>;

    /// Summaries for one owner (all records when `owner` is `None`),
    /// newest `updated_at` first
    fn list_by_owner(&self, owner: Option<&str>) -> Result<Vec<SessionSummary>>;

    /// Up to `limit` full sessions for one owner, newest first
    fn load_recent(&self, owner: Option<&str>, limit: usize) -> Result<Vec<Session>>;

    /// Sessions whose title or any message contains `query`, ignoring case
    ///
    /// Backends without the capability report
    /// [`ThreadkeepError::UnsupportedOperation`].
    fn find_by_text(&self, _query: &str) -> Result<Vec<SessionSummary>> {
        Err(ThreadkeepError::UnsupportedOperation(format!(
            "text search is not available on the {} backend",
            self.kind()
        ))
        .into())
    }

    /// Number of records across the whole backend
    fn count_sessions(&self) -> Result<usize>;

    /// Number of messages across the whole backend
    fn count_messages(&self) -> Result<usize>;

    /// Whether a record with this id exists
    fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.fetch(id)?.is_some())
    }

    /// Records `owner`'s current-session pointer; `None` clears it
    ///
    /// Each owner has its own pointer, and the owner-less store has one of
    /// its own too. Deleting a session clears every pointer naming it.
    fn save_current(&self, owner: Option<&str>, id: Option<&str>) -> Result<()>;

    /// Reads back the pointer written by [`StorageBackend::save_current`]
    fn load_current(&self, owner: Option<&str>) -> Result<Option<String>>;
}

/// Outcome of backend selection
pub struct BackendSelection {
    /// The backend to use
    pub backend: Box<dyn StorageBackend>,
    /// Which variant was chosen
    pub kind: BackendKind,
    /// Why the preferred variant was skipped, if it was
    pub fallback_reason: Option<String>,
}

impl std::fmt::Debug for BackendSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSelection")
            .field("kind", &self.kind)
            .field("fallback_reason", &self.fallback_reason)
            .finish()
    }
}

/// Result of probing the durable database
pub enum Probe {
    /// Connected and schema ready
    Available(SqliteStorage),
    /// Connectivity probe failed
    Unavailable(String),
    /// No database path configured
    Disabled,
}

/// Step one: probe the durable database described by `config`
pub fn probe_database(config: &StorageConfig) -> Probe {
    let Some(path) = &config.database_path else {
        return Probe::Disabled;
    };
    match SqliteStorage::connect(path, Duration::from_millis(config.connect_timeout_ms)) {
        Ok(storage) => Probe::Available(storage),
        Err(e) => Probe::Unavailable(e.to_string()),
    }
}

/// Step two: pick the database if the probe succeeded, else the file
///
/// # Errors
///
/// Returns [`ThreadkeepError::BackendUnavailable`] when the file variant
/// cannot be opened either.
pub fn select_backend(config: &StorageConfig) -> Result<BackendSelection> {
    let primary = match probe_database(config) {
        Probe::Available(storage) => Ok(Box::new(storage) as Box<dyn StorageBackend>),
        Probe::Unavailable(reason) => Err(ThreadkeepError::BackendUnavailable(reason).into()),
        Probe::Disabled => Err(ThreadkeepError::BackendUnavailable(
            "no database path configured".to_string(),
        )
        .into()),
    };
    let file_path = config.file_path.clone();
    select_with(primary, move || {
        Ok(Box::new(FileStorage::connect(file_path)?) as Box<dyn StorageBackend>)
    })
}

/// Chooses between an already-probed primary backend and a fallback
///
/// Any construction failure of the primary selects the fallback. The choice
/// is made once; nothing is re-evaluated per call.
pub fn select_with<F>(
    primary: Result<Box<dyn StorageBackend>>,
    fallback: F,
) -> Result<BackendSelection>
where
    F: FnOnce() -> Result<Box<dyn StorageBackend>>,
{
    match primary {
        Ok(backend) => {
            let kind = backend.kind();
            tracing::info!("Using {} storage backend", kind);
            Ok(BackendSelection {
                backend,
                kind,
                fallback_reason: None,
            })
        }
        Err(reason) => {
            tracing::warn!("Primary storage unavailable ({}), falling back", reason);
            let backend = fallback()?;
            let kind = backend.kind();
            tracing::info!("Using {} storage backend", kind);
            Ok(BackendSelection {
                backend,
                kind,
                fallback_reason: Some(reason.to_string()),
            })
        }
    }
}

/// Maps a backend error into a storage fault with context
pub(crate) fn fault<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> ThreadkeepError {
    move |e| ThreadkeepError::StorageFault(format!("{}: {}", what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn storage_config(dir: &std::path::Path, database: Option<PathBuf>) -> StorageConfig {
        StorageConfig {
            database_path: database,
            file_path: dir.join("chat_sessions.json"),
            connect_timeout_ms: 500,
        }
    }

    #[test]
    fn test_select_prefers_database() {
        let dir = tempdir().expect("failed to create tempdir");
        let config = storage_config(dir.path(), Some(dir.path().join("sessions.db")));

        let selection = select_backend(&config).expect("selection failed");
        assert_eq!(selection.kind, BackendKind::Database);
        assert!(selection.fallback_reason.is_none());
    }

    #[test]
    fn test_select_falls_back_when_probe_fails() {
        let dir = tempdir().expect("failed to create tempdir");
        // A regular file where the database directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let config = storage_config(dir.path(), Some(blocker.join("sessions.db")));

        let selection = select_backend(&config).expect("selection failed");
        assert_eq!(selection.kind, BackendKind::File);
        assert!(selection.fallback_reason.is_some());
    }

    #[test]
    fn test_select_uses_file_when_database_disabled() {
        let dir = tempdir().expect("failed to create tempdir");
        let config = storage_config(dir.path(), None);

        let selection = select_backend(&config).expect("selection failed");
        assert_eq!(selection.kind, BackendKind::File);
        assert_eq!(
            selection.fallback_reason.as_deref(),
            Some("Storage backend unavailable: no database path configured")
        );
    }

    #[test]
    fn test_select_with_reports_fallback_failure() {
        let primary: Result<Box<dyn StorageBackend>> =
            Err(ThreadkeepError::BackendUnavailable("down".into()).into());
        let err = select_with(primary, || {
            Err(ThreadkeepError::BackendUnavailable("also down".into()).into())
        })
        .unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(ThreadkeepError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_probe_disabled_without_path() {
        let dir = tempdir().expect("failed to create tempdir");
        let config = storage_config(dir.path(), None);
        assert!(matches!(probe_database(&config), Probe::Disabled));
    }
}
