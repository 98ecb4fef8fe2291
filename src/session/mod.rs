//! Session entity
//!
//! A `Session` is one persisted conversation thread. Its fields are read-only
//! outside the crate: every mutation goes through `SessionStore`, which
//! persists it in the same operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod clock;

/// Title given to sessions created without one
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum number of characters kept when deriving a title from a message
pub const TITLE_MAX_CHARS: usize = 50;

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user
    User,
    /// Reply produced by the assistant
    Assistant,
}

impl Role {
    /// Lowercase name as persisted
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message
    pub role: Role,
    /// Message text
    pub content: String,
    /// When the message was appended
    #[serde(with = "clock::rfc3339_micros")]
    pub timestamp: DateTime<Utc>,
}

/// One conversation thread
///
/// Serializes to the persisted record shape shared by every backend:
/// `{session_id, title, owner?, messages, created_at, updated_at,
/// is_first_message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "session_id")]
    id: String,
    title: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(with = "clock::rfc3339_micros")]
    created_at: DateTime<Utc>,
    #[serde(with = "clock::rfc3339_micros")]
    updated_at: DateTime<Utc>,
    #[serde(default = "default_is_first_message")]
    is_first_message: bool,
}

fn default_is_first_message() -> bool {
    true
}

impl Session {
    /// Creates an empty session
    ///
    /// # Examples
    ///
    /// ```
    /// use threadkeep::session::{Session, DEFAULT_TITLE};
    ///
    /// let session = Session::new("20240101_000000_000001", DEFAULT_TITLE, Some("alice"));
    /// assert!(session.messages().is_empty());
    /// assert!(session.is_first_message());
    /// assert_eq!(session.created_at(), session.updated_at());
    /// ```
    pub fn new(id: impl Into<String>, title: impl Into<String>, owner: Option<&str>) -> Self {
        let now = clock::now();
        Self {
            id: id.into(),
            title: title.into(),
            owner: owner.map(str::to_string),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            is_first_message: true,
        }
    }

    /// Rebuilds a session from its persisted columns
    pub(crate) fn restore(
        id: String,
        title: String,
        owner: Option<String>,
        messages: Vec<ChatMessage>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        is_first_message: bool,
    ) -> Self {
        Self {
            id,
            title,
            owner,
            messages,
            created_at,
            updated_at: updated_at.max(created_at),
            is_first_message,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the assistant has not yet replied in this session
    pub fn is_first_message(&self) -> bool {
        self.is_first_message
    }

    /// The last `window` messages, oldest first
    pub fn history(&self, window: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }

    /// Appends a message and advances `updated_at`
    ///
    /// The first user message replaces the default title. An assistant
    /// message ends the greeting phase.
    pub(crate) fn push_message(&mut self, role: Role, content: &str) {
        if role == Role::User && self.title == DEFAULT_TITLE && !self.has_user_message() {
            self.title = derive_title(content);
        }
        if role == Role::Assistant {
            self.is_first_message = false;
        }

        let timestamp = clock::advance(self.updated_at);
        self.messages.push(ChatMessage {
            role,
            content: content.to_string(),
            timestamp,
        });
        self.updated_at = timestamp;
    }

    pub(crate) fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.touch();
    }

    pub(crate) fn clear_messages(&mut self) {
        self.messages.clear();
        self.is_first_message = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = clock::advance(self.updated_at);
    }

    fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::User)
    }
}

/// Title derived from a message: the first 50 characters, plus `...` when cut
pub fn derive_title(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_QUESTION: &str =
        "Explain quicksort algorithm performance characteristics in depth please";

    #[test]
    fn test_derive_title_truncates_to_fifty_chars() {
        let title = derive_title(LONG_QUESTION);
        assert_eq!(title, format!("{}...", &LONG_QUESTION[..50]));
        assert_eq!(title.chars().count(), 53);
    }

    #[test]
    fn test_derive_title_keeps_short_text() {
        assert_eq!(derive_title("What is a heap?"), "What is a heap?");
        let exactly_fifty = "x".repeat(50);
        assert_eq!(derive_title(&exactly_fifty), exactly_fifty);
    }

    #[test]
    fn test_derive_title_counts_characters_not_bytes() {
        let text = "é".repeat(60);
        let title = derive_title(&text);
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }

    #[test]
    fn test_first_user_message_sets_title_once() {
        let mut session = Session::new("s1", DEFAULT_TITLE, None);
        session.push_message(Role::User, LONG_QUESTION);
        let derived = session.title().to_string();
        assert!(derived.ends_with("..."));

        session.push_message(Role::Assistant, "Quicksort averages O(n log n).");
        session.push_message(Role::User, "And the worst case?");
        assert_eq!(session.title(), derived);
    }

    #[test]
    fn test_custom_title_is_never_replaced() {
        let mut session = Session::new("s1", "Sorting notes", None);
        session.push_message(Role::User, "hello");
        assert_eq!(session.title(), "Sorting notes");
    }

    #[test]
    fn test_title_not_derived_after_clear() {
        let mut session = Session::new("s1", DEFAULT_TITLE, None);
        session.push_message(Role::User, "first topic");
        session.clear_messages();
        session.push_message(Role::User, "second topic");
        assert_eq!(session.title(), "first topic");
    }

    #[test]
    fn test_assistant_reply_ends_first_message_phase() {
        let mut session = Session::new("s1", DEFAULT_TITLE, None);
        session.push_message(Role::User, "hi");
        assert!(session.is_first_message());
        session.push_message(Role::Assistant, "hello!");
        assert!(!session.is_first_message());

        session.clear_messages();
        assert!(session.is_first_message());
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_every_mutation_advances_updated_at() {
        let mut session = Session::new("s1", DEFAULT_TITLE, None);
        let mut last = session.updated_at();

        session.push_message(Role::User, "a");
        assert!(session.updated_at() > last);
        last = session.updated_at();

        session.set_title("renamed");
        assert!(session.updated_at() > last);
        last = session.updated_at();

        session.clear_messages();
        assert!(session.updated_at() > last);
        assert!(session.updated_at() >= session.created_at());
    }

    #[test]
    fn test_messages_keep_insertion_order() {
        let mut session = Session::new("s1", DEFAULT_TITLE, None);
        for text in ["one", "two", "two", "three"] {
            session.push_message(Role::User, text);
        }
        let contents: Vec<_> = session.messages().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "two", "three"]);
    }

    #[test]
    fn test_history_window() {
        let mut session = Session::new("s1", DEFAULT_TITLE, None);
        for i in 0..8 {
            session.push_message(Role::User, &format!("m{}", i));
        }
        let window = session.history(6);
        assert_eq!(window.len(), 6);
        assert_eq!(window[0].content, "m2");
        assert_eq!(session.history(100).len(), 8);
    }

    #[test]
    fn test_record_shape() {
        let mut session = Session::new("20240101_000000_000001", DEFAULT_TITLE, Some("alice"));
        session.push_message(Role::User, "hi");
        let value = serde_json::to_value(&session).unwrap();

        assert_eq!(value["session_id"], "20240101_000000_000001");
        assert_eq!(value["owner"], "alice");
        assert_eq!(value["messages"][0]["role"], "user");
        assert!(value["created_at"].is_string());
        assert_eq!(value["is_first_message"], true);

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_record_defaults_for_missing_fields() {
        let json = r#"{
            "session_id": "legacy",
            "title": "Old chat",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z"
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert!(session.owner().is_none());
        assert!(session.messages().is_empty());
        assert!(session.is_first_message());
    }
}
