//! Database schema and record types

use crate::conversation::{Conversation, LogEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    path TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    messages TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, updated_at DESC);
";

/// Persisted chat: the full log plus ownership and listing metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub path: String,
    pub messages: Vec<LogEntry>,
}

impl ChatRecord {
    /// Snapshot a conversation for `user_id`.
    pub fn from_conversation(
        conversation: &Conversation,
        user_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: conversation.session_id.clone(),
            title: conversation.title(),
            user_id: user_id.into(),
            created_at,
            updated_at: Utc::now(),
            path: chat_path(&conversation.session_id),
            messages: conversation.entries.clone(),
        }
    }

    pub fn to_conversation(&self) -> Conversation {
        Conversation {
            session_id: self.id.clone(),
            entries: self.messages.clone(),
        }
    }
}

/// Row of the chat list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn chat_path(chat_id: &str) -> String {
    format!("/chat/{chat_id}")
}
