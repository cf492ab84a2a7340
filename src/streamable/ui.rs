//! Streamable UI nodes

use super::{Slot, StreamClosedError, StreamReader, StreamStatus};
use crate::ui::{UiNode, FAILURE_MESSAGE};

/// Single-writer handle for a renderable node
///
/// Unlike [`super::StreamableValue`], updates replace the node wholesale.
pub struct StreamableUi {
    slot: Slot<UiNode>,
}

impl StreamableUi {
    pub fn new(initial: UiNode) -> Self {
        Self {
            slot: Slot::new(initial),
        }
    }

    /// Replace the current node.
    pub fn update(&self, node: UiNode) -> Result<(), StreamClosedError> {
        self.slot.write(|current| *current = node, false)
    }

    /// Commit the node, optionally replacing it first.
    pub fn done(&self, node: Option<UiNode>) -> Result<(), StreamClosedError> {
        self.slot.write(
            |current| {
                if let Some(node) = node {
                    *current = node;
                }
            },
            true,
        )
    }

    /// Commit a failure rendering.
    pub fn error(&self, message: impl Into<String>) -> Result<(), StreamClosedError> {
        self.done(Some(UiNode::error(message)))
    }

    pub fn reader(&self) -> StreamReader<UiNode> {
        self.slot.reader()
    }

    pub fn status(&self) -> StreamStatus {
        self.slot.status()
    }
}

impl Drop for StreamableUi {
    fn drop(&mut self) {
        if self.slot.status() == StreamStatus::Open {
            tracing::warn!("Streamable UI dropped while open, resolving to failure");
            let _ = self.error(FAILURE_MESSAGE);
        }
    }
}
