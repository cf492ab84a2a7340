//! API request and response types

use crate::db::ChatSummary;
use crate::display::DisplayEntry;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatSummary>,
}

/// Display state for a returning client. `null` without an identity.
#[derive(Debug, Serialize)]
pub struct DisplayResponse {
    pub display: Option<Vec<DisplayEntry>>,
}

/// First event of a streamed turn
#[derive(Debug, Serialize)]
pub struct TurnEvent {
    pub id: String,
}

/// Serialized snapshot of a live node
#[derive(Debug, Clone, Serialize)]
pub struct NodeUpdate {
    pub node: serde_json::Value,
    pub done: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
