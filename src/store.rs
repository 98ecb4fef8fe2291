//! Session store
//!
//! `SessionStore` is the single source of truth for which sessions exist,
//! which one is current and which are held in memory. Every mutation is
//! persisted through the storage backend before the call returns; if the
//! persist fails, the in-memory state is left untouched and the fault is
//! returned.
//!
//! One store serves one owner and expects a single writer.

use crate::config::Config;
use crate::error::{Result, ThreadkeepError};
use crate::session::{clock, Role, Session, DEFAULT_TITLE};
use crate::storage::{self, BackendKind, SessionSummary, StorageBackend};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Upper bound on id candidates tried before giving up
pub const MAX_ID_ATTEMPTS: usize = 1000;

/// Pause between id candidates after a collision
const ID_RETRY_PAUSE: Duration = Duration::from_millis(1);

/// Source of candidate session ids
pub trait IdSource: Send {
    /// Produces the next candidate; the store checks it for uniqueness
    fn candidate(&mut self) -> String;
}

/// Ids from the wall clock, `YYYYMMDD_HHMMSS_ffffff`
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampIds;

impl IdSource for TimestampIds {
    fn candidate(&mut self) -> String {
        clock::session_id_at(clock::now())
    }
}

/// A session summary annotated for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionListing {
    #[serde(flatten)]
    pub summary: SessionSummary,
    /// Whether this is the store's current session
    pub is_current: bool,
}

/// Aggregate counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Sessions in the whole backend
    pub total_sessions: usize,
    /// Messages in the whole backend
    pub total_messages: usize,
    /// Sessions held in memory by this store
    pub sessions_resident: usize,
}

/// Bounded working set of sessions over a storage backend
pub struct SessionStore {
    backend: Box<dyn StorageBackend>,
    owner: Option<String>,
    working_set: HashMap<String, Session>,
    current_id: Option<String>,
    working_set_limit: usize,
    ids: Box<dyn IdSource>,
    last_issued: Option<String>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("backend", &self.backend.kind())
            .field("owner", &self.owner)
            .field("resident", &self.working_set.len())
            .field("current_id", &self.current_id)
            .finish()
    }
}

impl SessionStore {
    /// Builds a store for `owner`, selecting the backend from `config`
    ///
    /// The database is probed first and the file backend is used if the
    /// probe fails. The choice is logged and available through
    /// [`SessionStore::backend_kind`].
    pub fn open(config: &Config, owner: Option<&str>) -> Result<Self> {
        let selection = storage::select_backend(&config.storage)?;
        if let Some(reason) = &selection.fallback_reason {
            tracing::warn!(
                "Session store for {:?} using {} backend: {}",
                owner,
                selection.kind,
                reason
            );
        }
        Self::with_backend(selection.backend, owner, config.store.working_set_limit)
    }

    /// Builds a store over an already-selected backend
    ///
    /// Loads the `working_set_limit` most recently updated sessions of
    /// `owner`. The current session becomes the backend's recorded pointer
    /// when it is among them, otherwise the most recent one. With no
    /// sessions there is no current session.
    pub fn with_backend(
        backend: Box<dyn StorageBackend>,
        owner: Option<&str>,
        working_set_limit: usize,
    ) -> Result<Self> {
        let working_set_limit = working_set_limit.max(1);
        let recent = backend.load_recent(owner, working_set_limit)?;
        let most_recent = recent.first().map(|s| s.id().to_string());
        let working_set: HashMap<String, Session> = recent
            .into_iter()
            .map(|s| (s.id().to_string(), s))
            .collect();

        let recorded = backend
            .load_current(owner)?
            .filter(|id| working_set.contains_key(id));
        let current_id = recorded.or(most_recent);

        tracing::debug!(
            "Loaded {} sessions for {:?} from {} backend",
            working_set.len(),
            owner,
            backend.kind()
        );

        let store = Self {
            backend,
            owner: owner.map(str::to_string),
            working_set,
            current_id,
            working_set_limit,
            ids: Box::new(TimestampIds),
            last_issued: None,
        };
        store.publish_resident();
        Ok(store)
    }

    /// Replaces the id source
    pub fn with_id_source(mut self, ids: Box<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Which backend variant serves this store
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Owner this store is bound to
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Creates a session, makes it current and persists it
    ///
    /// `None` uses the default title, which the first user message will
    /// replace.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadkeepError::UniquenessExhausted`] if no free id is
    /// found, or a storage fault if the persist fails. On a fault neither
    /// the working set nor the current session changes.
    pub fn create_session(&mut self, title: Option<&str>) -> Result<String> {
        let id = self.next_id()?;
        let session = Session::new(id.clone(), title.unwrap_or(DEFAULT_TITLE), self.owner());

        // A pointer naming a session that never got stored is ignored on load
        self.persist_current(Some(&id))?;
        if let Err(err) = self.backend.upsert(&session) {
            self.restore_pointer();
            return Err(err);
        }
        self.last_issued = Some(id.clone());
        self.working_set.insert(id.clone(), session);
        self.current_id = Some(id.clone());
        self.enforce_limit();

        tracing::info!("Created session {}", id);
        Ok(id)
    }

    /// The current session, if any
    ///
    /// Never creates one.
    pub fn get_current(&self) -> Option<&Session> {
        self.current_id
            .as_ref()
            .and_then(|id| self.working_set.get(id))
    }

    /// Id of the current session, if any
    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// A resident session by id
    pub fn session(&self, id: &str) -> Option<&Session> {
        self.working_set.get(id)
    }

    /// Number of sessions held in memory
    pub fn resident_count(&self) -> usize {
        self.working_set.len()
    }

    /// Makes `id` current, loading it from the backend if needed
    ///
    /// Returns false, leaving the current session unchanged, if the session
    /// does not exist or belongs to another owner.
    pub fn switch_to(&mut self, id: &str) -> Result<bool> {
        let loaded = if self.working_set.contains_key(id) {
            None
        } else {
            match self.fetch_visible(id)? {
                Some(session) => Some(session),
                None => return Ok(false),
            }
        };

        self.persist_current(Some(id))?;
        if let Some(session) = loaded {
            self.working_set.insert(id.to_string(), session);
        }
        self.current_id = Some(id.to_string());
        self.enforce_limit();
        tracing::debug!("Switched to session {}", id);
        Ok(true)
    }

    /// Deletes a session from the backend and from memory
    ///
    /// When the current session is deleted, the remaining resident session
    /// with the latest `updated_at` becomes current (greatest id on ties), or
    /// none if the working set is empty.
    ///
    /// The replacement pointer is persisted before the session is removed,
    /// so a fault at either step leaves the store as it was.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let resident = self.working_set.contains_key(id);
        if !resident && self.fetch_visible(id)?.is_none() {
            return Ok(false);
        }

        let was_current = self.current_id.as_deref() == Some(id);
        let next = if was_current {
            let next = self.most_recent_resident_except(id);
            self.persist_current(next.as_deref())?;
            next
        } else {
            self.current_id.clone()
        };

        let removed = match self.backend.delete(id) {
            Ok(removed) => removed,
            Err(err) => {
                if was_current {
                    self.restore_pointer();
                }
                return Err(err);
            }
        };
        self.working_set.remove(id);
        self.current_id = next;
        self.publish_resident();

        tracing::info!("Deleted session {}", id);
        Ok(removed || resident)
    }

    /// Renames a session, resident or not
    pub fn rename(&mut self, id: &str, title: &str) -> Result<bool> {
        self.modify(id, |session| session.set_title(title))
    }

    /// Appends a message to a session
    ///
    /// The first user message of a session with the default title becomes
    /// its title (first 50 characters, `...` when cut). An assistant message
    /// ends the session's first-message phase.
    pub fn append_message(&mut self, id: &str, role: Role, content: &str) -> Result<bool> {
        self.modify(id, |session| session.push_message(role, content))
    }

    /// Empties a session's messages and restarts its first-message phase
    pub fn clear_messages(&mut self, id: &str) -> Result<bool> {
        self.modify(id, Session::clear_messages)
    }

    /// Clears the current session
    ///
    /// Returns false if there is no current session.
    pub fn clear_current(&mut self) -> Result<bool> {
        match self.current_id.clone() {
            Some(id) => self.clear_messages(&id),
            None => Ok(false),
        }
    }

    /// Summaries of this owner's sessions, most recently updated first
    pub fn list_all(&self) -> Result<Vec<SessionListing>> {
        let summaries = self.backend.list_by_owner(self.owner())?;
        Ok(summaries
            .into_iter()
            .map(|summary| {
                let is_current = self.current_id.as_deref() == Some(summary.id.as_str());
                SessionListing {
                    summary,
                    is_current,
                }
            })
            .collect())
    }

    /// Sessions whose title or messages contain `query`, ignoring case
    ///
    /// # Errors
    ///
    /// Returns [`ThreadkeepError::UnsupportedOperation`] when the backend
    /// cannot search.
    pub fn search_by_text(&self, query: &str) -> Result<Vec<SessionSummary>> {
        let hits = self.backend.find_by_text(query.trim())?;
        Ok(hits
            .into_iter()
            .filter(|summary| self.owner.is_none() || summary.owner == self.owner)
            .collect())
    }

    /// Totals across the backend plus the resident count
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_sessions: self.backend.count_sessions()?,
            total_messages: self.backend.count_messages()?,
            sessions_resident: self.working_set.len(),
        })
    }

    /// Applies `change` to a session and persists it
    ///
    /// Resident sessions are changed on a copy that replaces the original
    /// only after the backend accepted it. Non-resident sessions are changed
    /// in the backend without being loaded.
    fn modify<F>(&mut self, id: &str, change: F) -> Result<bool>
    where
        F: FnOnce(&mut Session),
    {
        let mut session = match self.working_set.get(id) {
            Some(resident) => resident.clone(),
            None => match self.fetch_visible(id)? {
                Some(stored) => stored,
                None => return Ok(false),
            },
        };

        change(&mut session);
        self.backend.upsert(&session)?;

        if let Some(resident) = self.working_set.get_mut(id) {
            *resident = session;
        }
        Ok(true)
    }

    fn next_id(&mut self) -> Result<String> {
        for attempt in 0..MAX_ID_ATTEMPTS {
            if attempt > 0 {
                std::thread::sleep(ID_RETRY_PAUSE);
            }
            let candidate = self.ids.candidate();
            if self.last_issued.as_deref() == Some(candidate.as_str())
                || self.working_set.contains_key(&candidate)
                || self.backend.exists(&candidate)?
            {
                tracing::debug!("Session id {} already taken, retrying", candidate);
                continue;
            }
            return Ok(candidate);
        }
        Err(ThreadkeepError::UniquenessExhausted {
            attempts: MAX_ID_ATTEMPTS,
        }
        .into())
    }

    fn fetch_visible(&self, id: &str) -> Result<Option<Session>> {
        Ok(self
            .backend
            .fetch(id)?
            .filter(|session| self.owner.is_none() || session.owner() == self.owner()))
    }

    fn persist_current(&self, id: Option<&str>) -> Result<()> {
        self.backend.save_current(self.owner(), id)
    }

    /// Puts the persisted pointer back to the in-memory one after a failed step
    fn restore_pointer(&self) {
        if let Err(err) = self.persist_current(self.current_id.as_deref()) {
            tracing::warn!(
                "Could not restore current session pointer for {:?}: {}",
                self.owner,
                err
            );
        }
    }

    fn most_recent_resident_except(&self, excluded: &str) -> Option<String> {
        self.working_set
            .values()
            .filter(|s| s.id() != excluded)
            .max_by(|a, b| {
                a.updated_at()
                    .cmp(&b.updated_at())
                    .then_with(|| a.id().cmp(b.id()))
            })
            .map(|s| s.id().to_string())
    }

    /// Evicts the least recently updated non-current sessions from memory
    fn enforce_limit(&mut self) {
        while self.working_set.len() > self.working_set_limit {
            let victim = self
                .working_set
                .values()
                .filter(|s| Some(s.id()) != self.current_id.as_deref())
                .min_by(|a, b| {
                    a.updated_at()
                        .cmp(&b.updated_at())
                        .then_with(|| a.id().cmp(b.id()))
                })
                .map(|s| s.id().to_string());
            match victim {
                Some(id) => {
                    self.working_set.remove(&id);
                    tracing::debug!("Evicted session {} from working set", id);
                }
                None => break,
            }
        }
        self.publish_resident();
    }

    fn publish_resident(&self) {
        metrics::gauge!(
            "session_store_resident_sessions",
            self.working_set.len() as f64
        );
    }
}
