use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use threadkeep::storage::{FileStorage, SqliteStorage, StorageBackend};
use threadkeep::SessionStore;

#[allow(dead_code)]
pub fn create_temp_sqlite() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let storage = SqliteStorage::connect(tmp.path().join("sessions.db"), Duration::from_secs(1))
        .expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn open_sqlite(dir: &Path) -> Box<dyn StorageBackend> {
    Box::new(
        SqliteStorage::connect(dir.join("sessions.db"), Duration::from_secs(1))
            .expect("failed to open sqlite storage"),
    )
}

#[allow(dead_code)]
pub fn open_file(dir: &Path) -> Box<dyn StorageBackend> {
    Box::new(FileStorage::connect(dir.join("chat_sessions.json")).expect("failed to open file"))
}

/// Openers for both backend variants, labelled
#[allow(dead_code)]
pub fn backends() -> Vec<(&'static str, fn(&Path) -> Box<dyn StorageBackend>)> {
    vec![
        ("sqlite", open_sqlite as fn(&Path) -> Box<dyn StorageBackend>),
        ("file", open_file as fn(&Path) -> Box<dyn StorageBackend>),
    ]
}

#[allow(dead_code)]
pub fn store_over(backend: Box<dyn StorageBackend>, owner: Option<&str>) -> SessionStore {
    SessionStore::with_backend(backend, owner, 10).expect("failed to open session store")
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("threadkeep.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
