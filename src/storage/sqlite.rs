//! Durable-database storage variant backed by SQLite

use super::{fault, BackendKind, SessionSummary, StorageBackend};
use crate::error::{Result, ThreadkeepError};
use crate::session::{clock, ChatMessage, Session};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    owner TEXT,
    messages JSON NOT NULL,
    message_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_first_message INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions (updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_sessions_owner ON sessions (owner);
CREATE TABLE IF NOT EXISTS current_sessions (
    owner_key TEXT PRIMARY KEY,
    session_id TEXT NOT NULL
);
";

/// `current_sessions` key for the owner-less store
const NO_OWNER_KEY: &str = "";

const SESSION_COLUMNS: &str =
    "session_id, title, owner, messages, created_at, updated_at, is_first_message";

const SUMMARY_COLUMNS: &str = "session_id, title, owner, message_count, updated_at";

/// Raw column values of one session row, decoded outside the row closure
struct SessionRow {
    id: String,
    title: String,
    owner: Option<String>,
    messages_json: String,
    created_at: String,
    updated_at: String,
    is_first_message: bool,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            owner: row.get(2)?,
            messages_json: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
            is_first_message: row.get(6)?,
        })
    }

    fn into_session(self) -> Result<Session> {
        let messages: Vec<ChatMessage> = serde_json::from_str(&self.messages_json)
            .map_err(fault("Failed to deserialize messages"))?;
        let created_at =
            clock::parse(&self.created_at).map_err(fault("Invalid created_at timestamp"))?;
        let updated_at =
            clock::parse(&self.updated_at).map_err(fault("Invalid updated_at timestamp"))?;
        Ok(Session::restore(
            self.id,
            self.title,
            self.owner,
            messages,
            created_at,
            updated_at,
            self.is_first_message,
        ))
    }
}

struct SummaryRow {
    id: String,
    title: String,
    owner: Option<String>,
    message_count: i64,
    updated_at: String,
}

impl SummaryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            owner: row.get(2)?,
            message_count: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_summary(self) -> Result<SessionSummary> {
        let updated_at =
            clock::parse(&self.updated_at).map_err(fault("Invalid updated_at timestamp"))?;
        Ok(SessionSummary {
            id: self.id,
            title: self.title,
            owner: self.owner,
            message_count: usize::try_from(self.message_count).unwrap_or(0),
            updated_at,
        })
    }
}

/// Session storage in an embedded SQLite database
///
/// Each operation opens its own connection, so the type holds no handle and
/// is trivially `Send`.
pub struct SqliteStorage {
    db_path: PathBuf,
    timeout: Duration,
}

impl SqliteStorage {
    /// Connects to the database at `db_path`, creating it if needed
    ///
    /// This is the connectivity probe: the parent directory is created, a
    /// connection is opened with `timeout` as busy timeout, the schema is
    /// applied and a trivial query is run.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadkeepError::BackendUnavailable`] if any step fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use threadkeep::storage::{SqliteStorage, StorageBackend, BackendKind};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let storage = SqliteStorage::connect(dir.path().join("sessions.db"), Duration::from_secs(1)).unwrap();
    /// assert_eq!(storage.kind(), BackendKind::Database);
    /// ```
    pub fn connect<P: Into<PathBuf>>(db_path: P, timeout: Duration) -> Result<Self> {
        let db_path = db_path.into();
        let storage = Self { db_path, timeout };
        if let Err(reason) = storage.probe() {
            return Err(ThreadkeepError::BackendUnavailable(format!(
                "{}: {}",
                storage.db_path.display(),
                reason
            ))
            .into());
        }
        tracing::debug!("SQLite storage ready at {}", storage.db_path.display());
        Ok(storage)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn probe(&self) -> std::result::Result<(), String> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }
        let conn = self.open().map_err(|e| e.to_string())?;
        conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(fault("Failed to open database"))?;
        conn.busy_timeout(self.timeout)
            .map_err(fault("Failed to set busy timeout"))?;
        Ok(conn)
    }

    fn query_sessions(&self, sql: &str, owner: Option<&str>, limit: i64) -> Result<Vec<Session>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(fault("Failed to prepare statement"))?;
        let rows = stmt
            .query_map(params![owner, limit], SessionRow::from_row)
            .map_err(fault("Failed to query sessions"))?;

        let mut sessions = Vec::new();
        for row in rows {
            let row = row.map_err(fault("Failed to read session row"))?;
            sessions.push(row.into_session()?);
        }
        Ok(sessions)
    }
}

/// Escapes `LIKE` wildcards so the query text matches literally
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl StorageBackend for SqliteStorage {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    fn upsert(&self, session: &Session) -> Result<()> {
        let messages_json = serde_json::to_string(session.messages())
            .map_err(fault("Failed to serialize messages"))?;
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO sessions (session_id, title, owner, messages, message_count,
                created_at, updated_at, is_first_message)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(session_id) DO UPDATE SET
                title = excluded.title,
                owner = excluded.owner,
                messages = excluded.messages,
                message_count = excluded.message_count,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                is_first_message = excluded.is_first_message",
            params![
                session.id(),
                session.title(),
                session.owner(),
                messages_json,
                session.messages().len() as i64,
                clock::format(session.created_at()),
                clock::format(session.updated_at()),
                session.is_first_message(),
            ],
        )
        .map_err(fault("Failed to upsert session"))?;
        Ok(())
    }

    fn fetch(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE session_id = ?1", SESSION_COLUMNS),
                params![id],
                SessionRow::from_row,
            )
            .optional()
            .map_err(fault("Failed to query session"))?;
        row.map(SessionRow::into_session).transpose()
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut conn = self.open()?;
        let tx = conn
            .transaction()
            .map_err(fault("Failed to begin transaction"))?;
        let removed = tx
            .execute("DELETE FROM sessions WHERE session_id = ?1", params![id])
            .map_err(fault("Failed to delete session"))?;
        tx.execute(
            "DELETE FROM current_sessions WHERE session_id = ?1",
            params![id],
        )
        .map_err(fault("Failed to clear current pointer"))?;
        tx.commit().map_err(fault("Failed to commit delete"))?;
        Ok(removed > 0)
    }

    fn list_by_owner(&self, owner: Option<&str>) -> Result<Vec<SessionSummary>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sessions
                WHERE (?1 IS NULL OR owner = ?1)
                ORDER BY updated_at DESC, session_id DESC",
                SUMMARY_COLUMNS
            ))
            .map_err(fault("Failed to prepare statement"))?;
        let rows = stmt
            .query_map(params![owner], SummaryRow::from_row)
            .map_err(fault("Failed to query sessions"))?;

        let mut summaries = Vec::new();
        for row in rows {
            let row = row.map_err(fault("Failed to read session row"))?;
            summaries.push(row.into_summary()?);
        }
        Ok(summaries)
    }

    fn load_recent(&self, owner: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_sessions(
            &format!(
                "SELECT {} FROM sessions
                WHERE (?1 IS NULL OR owner = ?1)
                ORDER BY updated_at DESC, session_id DESC
                LIMIT ?2",
                SESSION_COLUMNS
            ),
            owner,
            limit,
        )
    }

    fn find_by_text(&self, query: &str) -> Result<Vec<SessionSummary>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM sessions
                WHERE lower(title) LIKE ?1 ESCAPE '\\'
                    OR EXISTS (
                        SELECT 1 FROM json_each(sessions.messages)
                        WHERE lower(json_extract(value, '$.content')) LIKE ?1 ESCAPE '\\'
                    )
                ORDER BY updated_at DESC, session_id DESC",
                SUMMARY_COLUMNS
            ))
            .map_err(fault("Failed to prepare statement"))?;
        let rows = stmt
            .query_map(params![pattern], SummaryRow::from_row)
            .map_err(fault("Failed to search sessions"))?;

        let mut hits = Vec::new();
        for row in rows {
            let row = row.map_err(fault("Failed to read session row"))?;
            hits.push(row.into_summary()?);
        }
        Ok(hits)
    }

    fn count_sessions(&self) -> Result<usize> {
        let conn = self.open()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .map_err(fault("Failed to count sessions"))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn count_messages(&self) -> Result<usize> {
        let conn = self.open()?;
        let count: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(message_count), 0) FROM sessions",
                [],
                |row| row.get(0),
            )
            .map_err(fault("Failed to count messages"))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn save_current(&self, owner: Option<&str>, id: Option<&str>) -> Result<()> {
        let key = owner.unwrap_or(NO_OWNER_KEY);
        let conn = self.open()?;
        match id {
            Some(id) => conn.execute(
                "INSERT INTO current_sessions (owner_key, session_id) VALUES (?1, ?2)
                ON CONFLICT(owner_key) DO UPDATE SET session_id = excluded.session_id",
                params![key, id],
            ),
            None => conn.execute(
                "DELETE FROM current_sessions WHERE owner_key = ?1",
                params![key],
            ),
        }
        .map_err(fault("Failed to save current pointer"))?;
        Ok(())
    }

    fn load_current(&self, owner: Option<&str>) -> Result<Option<String>> {
        let conn = self.open()?;
        let current = conn
            .query_row(
                "SELECT session_id FROM current_sessions WHERE owner_key = ?1",
                params![owner.unwrap_or(NO_OWNER_KEY)],
                |row| row.get(0),
            )
            .optional()
            .map_err(fault("Failed to load current pointer"))?;
        Ok(current)
    }

    fn exists(&self, id: &str) -> Result<bool> {
        let conn = self.open()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?1",
                params![id],
                |_| Ok(true),
            )
            .optional()
            .map_err(fault("Failed to query session"))?;
        Ok(found.unwrap_or(false))
    }
}
