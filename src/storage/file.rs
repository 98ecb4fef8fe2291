//! Local-file storage variant
//!
//! All sessions live in one JSON document,
//! `{"sessions": [...], "current_session_id": ..., "current_by_owner": {...}}`,
//! which is rewritten in full on every save (temp file + rename).
//! `current_session_id` is the owner-less store's pointer; owners keep theirs
//! in `current_by_owner`.

use super::types::sort_newest_first;
use super::{fault, BackendKind, SessionSummary, StorageBackend};
use crate::error::{Result, ThreadkeepError};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(default)]
    sessions: Vec<Session>,
    #[serde(default)]
    current_session_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    current_by_owner: BTreeMap<String, String>,
}

impl SessionDocument {
    fn current(&self, owner: Option<&str>) -> Option<&str> {
        match owner {
            Some(owner) => self.current_by_owner.get(owner).map(String::as_str),
            None => self.current_session_id.as_deref(),
        }
    }

    fn set_current(&mut self, owner: Option<&str>, id: Option<&str>) {
        match (owner, id) {
            (Some(owner), Some(id)) => {
                self.current_by_owner
                    .insert(owner.to_string(), id.to_string());
            }
            (Some(owner), None) => {
                self.current_by_owner.remove(owner);
            }
            (None, id) => self.current_session_id = id.map(str::to_string),
        }
    }

    fn forget_pointers_to(&mut self, id: &str) {
        if self.current_session_id.as_deref() == Some(id) {
            self.current_session_id = None;
        }
        self.current_by_owner.retain(|_, current| current != id);
    }
}

/// Session storage in a single JSON file
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Opens the document at `path`
    ///
    /// A missing file is an empty store. The parent directory is created and
    /// an existing document must parse.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadkeepError::BackendUnavailable`] if the directory cannot
    /// be created or the existing document is unreadable.
    pub fn connect<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let storage = Self { path: path.into() };
        if let Some(parent) = storage.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ThreadkeepError::BackendUnavailable(format!("{}: {}", parent.display(), e))
                })?;
            }
        }
        if let Err(e) = storage.read() {
            return Err(ThreadkeepError::BackendUnavailable(format!(
                "{}: {}",
                storage.path.display(),
                e
            ))
            .into());
        }
        tracing::debug!("File storage ready at {}", storage.path.display());
        Ok(storage)
    }

    /// Path of the JSON document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SessionDocument> {
        if !self.path.exists() {
            return Ok(SessionDocument::default());
        }
        let contents =
            std::fs::read_to_string(&self.path).map_err(fault("Failed to read session file"))?;
        if contents.trim().is_empty() {
            return Ok(SessionDocument::default());
        }
        let document =
            serde_json::from_str(&contents).map_err(fault("Failed to parse session file"))?;
        Ok(document)
    }

    fn write(&self, document: &SessionDocument) -> Result<()> {
        let json = serde_json::to_string_pretty(document)
            .map_err(fault("Failed to serialize session file"))?;
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(fault("Failed to write session file"))?;
        std::fs::rename(&temp_path, &self.path).map_err(fault("Failed to replace session file"))?;
        Ok(())
    }

    fn owned_by<'a>(
        document: &'a SessionDocument,
        owner: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Session> + 'a {
        document
            .sessions
            .iter()
            .filter(move |s| owner.is_none() || s.owner() == owner)
    }
}

impl StorageBackend for FileStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn upsert(&self, session: &Session) -> Result<()> {
        let mut document = self.read()?;
        match document.sessions.iter_mut().find(|s| s.id() == session.id()) {
            Some(existing) => *existing = session.clone(),
            None => document.sessions.push(session.clone()),
        }
        self.write(&document)
    }

    fn fetch(&self, id: &str) -> Result<Option<Session>> {
        let document = self.read()?;
        Ok(document.sessions.into_iter().find(|s| s.id() == id))
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut document = self.read()?;
        let before = document.sessions.len();
        document.sessions.retain(|s| s.id() != id);
        if document.sessions.len() == before {
            return Ok(false);
        }
        document.forget_pointers_to(id);
        self.write(&document)?;
        Ok(true)
    }

    fn list_by_owner(&self, owner: Option<&str>) -> Result<Vec<SessionSummary>> {
        let document = self.read()?;
        let mut summaries: Vec<SessionSummary> = Self::owned_by(&document, owner)
            .map(SessionSummary::from)
            .collect();
        sort_newest_first(&mut summaries);
        Ok(summaries)
    }

    fn load_recent(&self, owner: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        let document = self.read()?;
        let mut sessions: Vec<Session> = Self::owned_by(&document, owner).cloned().collect();
        sessions.sort_by(|a, b| {
            b.updated_at()
                .cmp(&a.updated_at())
                .then_with(|| b.id().cmp(a.id()))
        });
        sessions.truncate(limit);
        Ok(sessions)
    }

    fn count_sessions(&self) -> Result<usize> {
        Ok(self.read()?.sessions.len())
    }

    fn count_messages(&self) -> Result<usize> {
        Ok(self
            .read()?
            .sessions
            .iter()
            .map(|s| s.messages().len())
            .sum())
    }

    fn save_current(&self, owner: Option<&str>, id: Option<&str>) -> Result<()> {
        let mut document = self.read()?;
        if document.current(owner) == id {
            return Ok(());
        }
        document.set_current(owner, id);
        self.write(&document)
    }

    fn load_current(&self, owner: Option<&str>) -> Result<Option<String>> {
        Ok(self.read()?.current(owner).map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::kind_of;
    use crate::session::{Role, DEFAULT_TITLE};
    use tempfile::tempdir;

    fn create_test_storage() -> (FileStorage, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let storage =
            FileStorage::connect(dir.path().join("chat_sessions.json")).expect("connect failed");
        (storage, dir)
    }

    fn session_with(id: &str, owner: Option<&str>, messages: &[&str]) -> Session {
        let mut session = Session::new(id, DEFAULT_TITLE, owner);
        for text in messages {
            session.push_message(Role::User, text);
        }
        session
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let (storage, _dir) = create_test_storage();
        assert!(!storage.path().exists());
        assert_eq!(storage.count_sessions().unwrap(), 0);
        assert!(storage.load_current(None).unwrap().is_none());
    }

    #[test]
    fn test_connect_rejects_corrupt_document() {
        let dir = tempdir().expect("failed to create tempdir");
        let path = dir.path().join("chat_sessions.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileStorage::connect(&path).err().expect("connect should fail");
        assert!(matches!(
            kind_of(&err),
            Some(ThreadkeepError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_document_layout() {
        let (storage, _dir) = create_test_storage();
        storage.upsert(&session_with("s1", Some("alice"), &["hi"])).unwrap();
        storage.save_current(None, Some("s1")).unwrap();
        storage.save_current(Some("alice"), Some("s1")).unwrap();

        let raw = std::fs::read_to_string(storage.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["current_session_id"], "s1");
        assert_eq!(value["current_by_owner"]["alice"], "s1");
        assert_eq!(value["sessions"][0]["session_id"], "s1");
        assert_eq!(value["sessions"][0]["owner"], "alice");
        assert_eq!(value["sessions"][0]["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let (storage, _dir) = create_test_storage();
        storage.upsert(&session_with("a", None, &[])).unwrap();
        storage.upsert(&session_with("b", None, &[])).unwrap();

        let mut a = storage.fetch("a").unwrap().unwrap();
        a.set_title("Renamed");
        storage.upsert(&a).unwrap();

        assert_eq!(storage.count_sessions().unwrap(), 2);
        assert_eq!(storage.fetch("a").unwrap().unwrap().title(), "Renamed");
    }

    #[test]
    fn test_upsert_twice_leaves_identical_file() {
        let (storage, _dir) = create_test_storage();
        let session = session_with("s1", None, &["hello"]);

        storage.upsert(&session).unwrap();
        let once = std::fs::read_to_string(storage.path()).unwrap();
        storage.upsert(&session).unwrap();
        let twice = std::fs::read_to_string(storage.path()).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_delete_clears_current_pointer() {
        let (storage, _dir) = create_test_storage();
        storage.upsert(&session_with("s1", None, &[])).unwrap();
        storage.save_current(None, Some("s1")).unwrap();
        storage.save_current(Some("alice"), Some("s1")).unwrap();

        assert!(storage.delete("s1").unwrap());
        assert!(!storage.delete("s1").unwrap());
        assert!(storage.load_current(None).unwrap().is_none());
        assert!(storage.load_current(Some("alice")).unwrap().is_none());
    }

    #[test]
    fn test_current_pointer_is_kept_per_owner() {
        let (storage, _dir) = create_test_storage();
        storage.save_current(Some("alice"), Some("a1")).unwrap();
        storage.save_current(Some("bob"), Some("b1")).unwrap();
        storage.save_current(None, Some("any")).unwrap();

        assert_eq!(storage.load_current(Some("alice")).unwrap().as_deref(), Some("a1"));
        assert_eq!(storage.load_current(Some("bob")).unwrap().as_deref(), Some("b1"));
        assert_eq!(storage.load_current(None).unwrap().as_deref(), Some("any"));

        storage.save_current(Some("bob"), None).unwrap();
        assert!(storage.load_current(Some("bob")).unwrap().is_none());
        assert_eq!(storage.load_current(Some("alice")).unwrap().as_deref(), Some("a1"));
    }

    #[test]
    fn test_reads_document_without_owner_pointers() {
        let (storage, _dir) = create_test_storage();
        std::fs::write(
            storage.path(),
            r#"{"sessions": [], "current_session_id": "legacy"}"#,
        )
        .unwrap();
        assert_eq!(storage.load_current(None).unwrap().as_deref(), Some("legacy"));
        assert!(storage.load_current(Some("alice")).unwrap().is_none());
    }

    #[test]
    fn test_list_by_owner_sorted_newest_first() {
        let (storage, _dir) = create_test_storage();
        storage.upsert(&session_with("old", Some("alice"), &["1"])).unwrap();
        storage.upsert(&session_with("bob", Some("bob"), &["2"])).unwrap();
        // Ensure a later updated_at for the newest session
        std::thread::sleep(std::time::Duration::from_millis(5));
        storage.upsert(&session_with("new", Some("alice"), &["3"])).unwrap();

        let ids: Vec<_> = storage
            .list_by_owner(Some("alice"))
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(storage.load_recent(Some("alice"), 1).unwrap()[0].id(), "new");
    }

    #[test]
    fn test_text_search_is_reported_unsupported() {
        let (storage, _dir) = create_test_storage();
        let err = storage.find_by_text("anything").unwrap_err();
        assert!(matches!(
            kind_of(&err),
            Some(ThreadkeepError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_counts() {
        let (storage, _dir) = create_test_storage();
        storage.upsert(&session_with("a", Some("alice"), &["1", "2"])).unwrap();
        storage.upsert(&session_with("b", Some("bob"), &["3"])).unwrap();
        assert_eq!(storage.count_sessions().unwrap(), 2);
        assert_eq!(storage.count_messages().unwrap(), 3);
    }
}
