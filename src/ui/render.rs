//! Renderers keyed by tool kind

use super::UiNode;
use crate::tools::{ToolKind, ToolOutput};

/// Finished view of a tool result.
pub fn tool_result(output: &ToolOutput) -> UiNode {
    match output {
        ToolOutput::ListMenuItems(list) => UiNode::bot_card(UiNode::MenuList {
            items: list.items.clone(),
        }),
        ToolOutput::ShowMenuItem(item) => {
            UiNode::bot_card(UiNode::MenuItemCard { item: item.clone() })
        }
        ToolOutput::ShowPurchase(details) => UiNode::bot_card(UiNode::Purchase {
            purchase: details.clone(),
        }),
        ToolOutput::Unrecognized { name, .. } => UiNode::Unrecognized {
            tool_name: name.clone(),
        },
    }
}

/// Placeholder shown while a tool call is in flight.
pub fn tool_loading(kind: &ToolKind) -> UiNode {
    UiNode::bot_card(UiNode::Skeleton {
        tool: kind.name().to_string(),
    })
}
