//! Renderable UI node tree
//!
//! Nodes are structured descriptions of what the client should draw. A node
//! may embed live readers, in which case serialization captures the latest
//! snapshot.

pub mod render;

use crate::streamable::StreamReader;
use crate::tools::{MenuItem, PurchaseDetails};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Shown wherever a turn fails without a more specific message
pub const FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// A renderable node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiNode {
    /// Renders nothing
    Empty,
    Spinner,
    UserMessage {
        text: String,
    },
    BotMessage {
        content: TextSource,
    },
    SystemMessage {
        text: String,
    },
    /// Spinner followed by a status line
    Progress {
        text: String,
    },
    /// Plain paragraph
    Notice {
        text: String,
    },
    BotCard {
        child: Box<UiNode>,
    },
    MenuList {
        items: Vec<MenuItem>,
    },
    MenuItemCard {
        item: MenuItem,
    },
    Purchase {
        purchase: PurchaseDetails,
    },
    /// Placeholder shown while a tool is running
    Skeleton {
        tool: String,
    },
    /// Result of a tool this build has no renderer for
    Unrecognized {
        tool_name: String,
    },
    Error {
        message: String,
    },
    Fragment {
        children: Vec<UiNode>,
    },
    /// A node that is still being streamed
    Live {
        stream: StreamReader<UiNode>,
    },
}

impl UiNode {
    pub fn user_message(text: impl Into<String>) -> Self {
        UiNode::UserMessage { text: text.into() }
    }

    pub fn bot_text(text: impl Into<String>) -> Self {
        UiNode::BotMessage {
            content: TextSource::Static(text.into()),
        }
    }

    pub fn bot_stream(reader: StreamReader<String>) -> Self {
        UiNode::BotMessage {
            content: TextSource::Streaming(reader),
        }
    }

    pub fn system_message(text: impl Into<String>) -> Self {
        UiNode::SystemMessage { text: text.into() }
    }

    pub fn progress(text: impl Into<String>) -> Self {
        UiNode::Progress { text: text.into() }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        UiNode::Notice { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        UiNode::Error {
            message: message.into(),
        }
    }

    pub fn bot_card(child: UiNode) -> Self {
        UiNode::BotCard {
            child: Box::new(child),
        }
    }

    pub fn live(stream: StreamReader<UiNode>) -> Self {
        UiNode::Live { stream }
    }

    /// Collapse a list of segments: none is empty, one is itself.
    pub fn fragment(mut children: Vec<UiNode>) -> Self {
        match children.len() {
            0 => UiNode::Empty,
            1 => children.remove(0),
            _ => UiNode::Fragment { children },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, UiNode::Error { .. })
    }

    /// Concatenated text of every message-like node, live content included
    pub fn plain_text(&self) -> String {
        match self {
            UiNode::UserMessage { text }
            | UiNode::SystemMessage { text }
            | UiNode::Progress { text }
            | UiNode::Notice { text } => text.clone(),
            UiNode::BotMessage { content } => content.text(),
            UiNode::Error { message } => message.clone(),
            UiNode::BotCard { child } => child.plain_text(),
            UiNode::Fragment { children } => children
                .iter()
                .map(UiNode::plain_text)
                .collect::<Vec<_>>()
                .join("\n"),
            UiNode::Live { stream } => stream.current().plain_text(),
            UiNode::Empty
            | UiNode::Spinner
            | UiNode::MenuList { .. }
            | UiNode::MenuItemCard { .. }
            | UiNode::Purchase { .. }
            | UiNode::Skeleton { .. }
            | UiNode::Unrecognized { .. } => String::new(),
        }
    }
}

/// Text of a bot message, either fixed or still streaming
#[derive(Debug, Clone)]
pub enum TextSource {
    Static(String),
    Streaming(StreamReader<String>),
}

impl TextSource {
    pub fn text(&self) -> String {
        match self {
            TextSource::Static(text) => text.clone(),
            TextSource::Streaming(reader) => reader.current(),
        }
    }

    pub fn is_settled(&self) -> bool {
        match self {
            TextSource::Static(_) => true,
            TextSource::Streaming(reader) => reader.is_done(),
        }
    }
}

/// Compares what a reader would see right now
impl PartialEq for TextSource {
    fn eq(&self, other: &Self) -> bool {
        self.text() == other.text()
    }
}

impl Serialize for TextSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TextSource", 2)?;
        state.serialize_field("text", &self.text())?;
        state.serialize_field("streaming", &!self.is_settled())?;
        state.end()
    }
}
