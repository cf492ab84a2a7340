//! Conversation log
//!
//! The authoritative, append-mostly record of a chat session. Readers take
//! immutable snapshots; writers go through an exclusive [`Turn`].

mod entry;
mod log;

#[cfg(test)]
mod proptests;

pub use entry::{Content, ContentPart, LogEntry, Role};
pub use log::{CommitHook, ConversationLog, LogError, Turn};

#[cfg(test)]
pub use log::NoopCommitHook;

use serde::{Deserialize, Serialize};

/// Longest title derived from the first message
pub const TITLE_MAX_CHARS: usize = 100;

/// Generate a fresh entry or session id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One session's ordered entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub session_id: String,
    pub entries: Vec<LogEntry>,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Vec::new(),
        }
    }

    /// Empty conversation with a generated id
    pub fn fresh() -> Self {
        Self::new(new_id())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Copy of this conversation with `entries` appended
    #[must_use]
    pub fn with_appended(&self, entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let mut next = self.clone();
        next.entries.extend(entries);
        next
    }

    /// Title for the chat list: the first user message, else the first
    /// text entry, truncated on a character boundary.
    pub fn title(&self) -> String {
        let first_text = self
            .entries
            .iter()
            .find(|e| e.role == Role::User && e.text().is_some())
            .or_else(|| self.entries.iter().find(|e| e.text().is_some()))
            .and_then(LogEntry::text)
            .unwrap_or_default();
        first_text.chars().take(TITLE_MAX_CHARS).collect()
    }
}
