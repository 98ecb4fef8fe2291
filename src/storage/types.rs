use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{clock, Session};

/// Metadata for a stored conversation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Unique identifier for the session
    pub id: String,
    /// User-facing title
    pub title: String,
    /// Owner the session belongs to, if any
    pub owner: Option<String>,
    /// Number of messages in the session
    pub message_count: usize,
    /// When the session was last updated
    #[serde(with = "clock::rfc3339_micros")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            title: session.title().to_string(),
            owner: session.owner().map(str::to_string),
            message_count: session.messages().len(),
            updated_at: session.updated_at(),
        }
    }
}

/// Which storage variant is serving a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded SQLite database
    Database,
    /// Single JSON document on local disk
    File,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Database => "database",
            BackendKind::File => "file",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorts summaries newest first; ties go to the greater id
pub(crate) fn sort_newest_first(summaries: &mut [SessionSummary]) {
    summaries.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
