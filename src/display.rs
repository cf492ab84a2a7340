//! Display state derived from the conversation log

use crate::conversation::{ContentPart, Conversation, LogEntry, Role};
use crate::tools::ToolOutput;
use crate::ui::{render, UiNode};
use serde::Serialize;

/// One renderable row of the chat transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayEntry {
    pub id: String,
    pub node: UiNode,
}

/// Project a conversation into display entries.
///
/// System entries are hidden. Ids are `{session}-{index}` over the remaining
/// entries; tool entries expand into `{session}-{index}-{k}`, one per result.
pub fn project(conversation: &Conversation) -> Vec<DisplayEntry> {
    let mut display = Vec::with_capacity(conversation.len());
    let visible = conversation
        .entries
        .iter()
        .filter(|entry| entry.role != Role::System);

    for (index, entry) in visible.enumerate() {
        let id = format!("{}-{index}", conversation.session_id);
        match entry.role {
            Role::Tool => {
                let results = entry.parts().iter().filter_map(|part| match part {
                    ContentPart::ToolResult {
                        tool_name, result, ..
                    } => Some(ToolOutput::from_name_and_value(tool_name, result.clone())),
                    ContentPart::ToolCall { .. } => None,
                });
                display.extend(results.enumerate().map(|(k, output)| DisplayEntry {
                    id: format!("{id}-{k}"),
                    node: render::tool_result(&output),
                }));
            }
            Role::User | Role::Assistant => display.push(DisplayEntry {
                id,
                node: text_node(entry),
            }),
            Role::System => {}
        }
    }
    display
}

fn text_node(entry: &LogEntry) -> UiNode {
    match (entry.role, entry.text()) {
        (Role::User, Some(text)) => UiNode::user_message(text),
        (Role::Assistant, Some(text)) => UiNode::bot_text(text),
        // Tool-call records have no standalone rendering
        _ => UiNode::Empty,
    }
}
