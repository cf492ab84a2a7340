//! Action dispatcher
//!
//! Each action appends its deterministic part to the log synchronously,
//! spawns the streaming tail and hands back live readers before the tail
//! finishes.

use super::session::SessionContext;
use super::traits::OrderService;
use crate::conversation::{
    new_id, Content, ContentPart, Conversation, LogEntry, LogError, Role, Turn,
};
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmRequest, LlmService, MessageRole, StreamPart,
    SystemContent,
};
use crate::streamable::{StreamClosedError, StreamReader, StreamableUi, StreamableValue};
use crate::system_prompt::build_system_prompt;
use crate::tools::{self, ToolKind};
use crate::ui::{render, UiNode, FAILURE_MESSAGE};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

const EMPTY_REPLY_MESSAGE: &str = "The assistant did not reply. Please try again.";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Errors that abort a background tail
#[derive(Debug, Error)]
enum TailError {
    #[error(transparent)]
    Closed(#[from] StreamClosedError),
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Dispatcher settings
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Offer the menu tools to the model
    pub enable_tools: bool,
    /// Delay before a tool result replaces its skeleton
    pub tool_latency: Duration,
    /// Delay between purchase progress milestones
    pub purchase_step: Duration,
    pub max_tokens: Option<u32>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            enable_tools: false,
            tool_latency: Duration::from_millis(1000),
            purchase_step: Duration::from_millis(1000),
            max_tokens: None,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .map_or(default, Duration::from_millis)
        };
        Self {
            enable_tools: std::env::var("MENUBOT_ENABLE_TOOLS")
                .is_ok_and(|v| matches!(v.as_str(), "1" | "true" | "yes")),
            tool_latency: millis("MENUBOT_TOOL_LATENCY_MS", defaults.tool_latency),
            purchase_step: millis("MENUBOT_PURCHASE_STEP_MS", defaults.purchase_step),
            max_tokens: std::env::var("MENUBOT_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// A live transcript row returned before its content settles
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub id: String,
    pub display: StreamReader<UiNode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PurchaseOrder {
    pub item: String,
    pub price: f64,
    pub quantity: i64,
}

impl PurchaseOrder {
    fn validate(&self) -> Result<(), DispatchError> {
        if self.item.trim().is_empty() {
            return Err(DispatchError::InvalidOrder("item is empty".to_string()));
        }
        if self.quantity < 1 {
            return Err(DispatchError::InvalidOrder(format!(
                "quantity must be at least 1, got {}",
                self.quantity
            )));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(DispatchError::InvalidOrder(format!(
                "price must be a non-negative amount, got {}",
                self.price
            )));
        }
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)] // quantities are small
    pub fn total(&self) -> f64 {
        self.price * self.quantity as f64
    }

    /// Log line recorded once the order completes
    pub fn log_line(&self) -> String {
        format!(
            "[User has purchased {} x {} at {}. Total cost = {}]",
            self.quantity,
            self.item,
            format_money(self.price),
            format_money(self.total())
        )
    }
}

pub struct PurchaseReply {
    pub purchasing_ui: StreamReader<UiNode>,
    pub new_message: TurnReply,
}

pub fn format_money(amount: f64) -> String {
    format!("${amount:.2}")
}

pub struct ActionDispatcher {
    llm: Arc<dyn LlmService>,
    orders: Arc<dyn OrderService>,
    config: DispatchConfig,
    tasks: TaskTracker,
}

impl ActionDispatcher {
    pub fn new(
        llm: Arc<dyn LlmService>,
        orders: Arc<dyn OrderService>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            llm,
            orders,
            config,
            tasks: TaskTracker::new(),
        }
    }

    /// Append the user's message and start the model reply.
    ///
    /// Returns as soon as the reply is streaming; the reader settles when the
    /// model finishes or fails.
    pub fn submit_user_message(
        &self,
        session: &SessionContext,
        content: &str,
    ) -> Result<TurnReply, DispatchError> {
        if content.trim().is_empty() {
            return Err(DispatchError::EmptyMessage);
        }
        let turn = session.log().begin_turn()?;
        turn.append([LogEntry::user(content)])?;

        let request = self.build_request(&turn.get());
        let ui = StreamableUi::new(UiNode::Spinner);
        let reply = TurnReply {
            id: new_id(),
            display: ui.reader(),
        };

        let span = tracing::info_span!(
            "turn",
            session_id = %session.session_id(),
            turn_id = %reply.id,
            model = %self.llm.model_id()
        );
        tracing::info!(parent: &span, "User message accepted");
        self.tasks.spawn(
            run_turn(self.llm.clone(), self.config.clone(), turn, ui, request).instrument(span),
        );
        Ok(reply)
    }

    /// Confirm a purchase the user accepted on a purchase card.
    pub fn confirm_purchase(
        &self,
        session: &SessionContext,
        order: PurchaseOrder,
    ) -> Result<PurchaseReply, DispatchError> {
        order.validate()?;
        let turn = session.log().begin_turn()?;

        let purchasing = StreamableUi::new(UiNode::progress(format!(
            "Purchasing {} {}...",
            order.quantity, order.item
        )));
        let system_message = StreamableUi::new(UiNode::Empty);
        let reply = PurchaseReply {
            purchasing_ui: purchasing.reader(),
            new_message: TurnReply {
                id: new_id(),
                display: system_message.reader(),
            },
        };

        let span = tracing::info_span!(
            "purchase",
            session_id = %session.session_id(),
            turn_id = %reply.new_message.id
        );
        self.tasks.spawn(
            run_purchase(
                self.orders.clone(),
                self.config.purchase_step,
                turn,
                purchasing,
                system_message,
                order,
            )
            .instrument(span),
        );
        Ok(reply)
    }

    /// Wait for every in-flight tail to finish.
    pub async fn drain(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Stop accepting tails and wait for the running ones.
    pub async fn shutdown(&self) {
        tracing::info!(in_flight = self.tasks.len(), "Draining in-flight turns");
        self.tasks.close();
        self.tasks.wait().await;
    }

    fn build_request(&self, conversation: &Conversation) -> LlmRequest {
        LlmRequest {
            system: vec![SystemContent::new(build_system_prompt(self.config.enable_tools))],
            messages: to_llm_messages(conversation),
            tools: if self.config.enable_tools {
                tools::definitions()
            } else {
                Vec::new()
            },
            max_tokens: self.config.max_tokens,
        }
    }
}

/// Map the log onto prompt history. Tool results travel as user-side
/// blocks; the provider splits them into its own message shape.
pub fn to_llm_messages(conversation: &Conversation) -> Vec<LlmMessage> {
    conversation
        .entries
        .iter()
        .filter_map(|entry| match (&entry.content, entry.role) {
            (Content::Text(text), Role::User | Role::Tool) => {
                Some(LlmMessage::text(MessageRole::User, text.clone()))
            }
            (Content::Text(text), Role::Assistant) => {
                Some(LlmMessage::text(MessageRole::Assistant, text.clone()))
            }
            (Content::Text(text), Role::System) => {
                Some(LlmMessage::text(MessageRole::System, text.clone()))
            }
            (Content::Parts(parts), role) => {
                let blocks: Vec<_> = parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::ToolCall {
                            tool_call_id,
                            tool_name,
                            args,
                        } => ContentBlock::tool_use(tool_call_id, tool_name, args.clone()),
                        ContentPart::ToolResult {
                            tool_call_id,
                            result,
                            ..
                        } => ContentBlock::tool_result(tool_call_id, result.to_string()),
                    })
                    .collect();
                let role = if role == Role::Assistant {
                    MessageRole::Assistant
                } else {
                    MessageRole::User
                };
                (!blocks.is_empty()).then_some(LlmMessage {
                    role,
                    content: blocks,
                })
            }
        })
        .collect()
}

/// How the model stream ended
enum StreamEnd {
    Completed,
    Empty,
    Failed(LlmError),
}

/// The turn's UI: an ordered list of segments published as one node
struct ReplyView<'a> {
    ui: &'a StreamableUi,
    segments: Vec<UiNode>,
    text: Option<StreamableValue<String>>,
}

impl<'a> ReplyView<'a> {
    fn new(ui: &'a StreamableUi) -> Self {
        Self {
            ui,
            segments: Vec::new(),
            text: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn push_segment(&mut self, node: UiNode) -> Result<(), StreamClosedError> {
        self.segments.push(node);
        self.ui.update(self.node())
    }

    /// The text value and its message node are created on the first delta.
    fn push_text(&mut self, delta: String) -> Result<(), StreamClosedError> {
        if self.text.is_none() {
            let value = StreamableValue::<String>::new();
            self.push_segment(UiNode::bot_stream(value.reader()))?;
            self.text = Some(value);
        }
        match &self.text {
            Some(value) => value.update(delta),
            None => Ok(()),
        }
    }

    /// Close the text value, returning everything streamed into it.
    fn finish_text(&mut self) -> Result<Option<String>, StreamClosedError> {
        let Some(value) = self.text.take() else {
            return Ok(None);
        };
        value.done(None)?;
        Ok(Some(value.reader().current()))
    }

    fn node(&self) -> UiNode {
        UiNode::fragment(self.segments.clone())
    }
}

async fn run_turn(
    llm: Arc<dyn LlmService>,
    config: DispatchConfig,
    turn: Turn,
    ui: StreamableUi,
    request: LlmRequest,
) {
    let mut view = ReplyView::new(&ui);
    let outcome = match stream_reply(&*llm, &request, &config, &turn, &mut view).await {
        Ok(end) => finish_reply(end, &turn, &mut view),
        Err(e) => Err(e),
    };
    drop(view);

    // The log is final here. End the turn before the reply settles so the
    // next message is accepted as soon as a client sees done
    let pending = turn.done_current();
    if let Err(e) = outcome.and_then(|node| ui.done(Some(node)).map_err(TailError::from)) {
        tracing::error!(error = %e, "Turn aborted");
    }
    // Unresolved handles render the failure message when dropped
    drop(ui);

    match pending {
        Ok(pending) => match pending.persist().await {
            Ok(()) => tracing::info!("Turn committed"),
            Err(e) => tracing::warn!(error = %e, "Turn commit failed"),
        },
        Err(e) => tracing::warn!(error = %e, "Turn commit failed"),
    }
}

async fn stream_reply(
    llm: &dyn LlmService,
    request: &LlmRequest,
    config: &DispatchConfig,
    turn: &Turn,
    view: &mut ReplyView<'_>,
) -> Result<StreamEnd, TailError> {
    let mut stream = match llm.stream(request).await {
        Ok(stream) => stream,
        Err(e) => return Ok(StreamEnd::Failed(e)),
    };

    while let Some(part) = stream.next().await {
        match part {
            Ok(StreamPart::TextDelta(delta)) => view.push_text(delta)?,
            Ok(StreamPart::ToolCall { id, name, input }) => {
                if config.enable_tools {
                    run_tool(config, turn, view, id, name, input).await?;
                } else {
                    tracing::warn!(tool = %name, "Ignoring tool call while tools are disabled");
                }
            }
            Ok(StreamPart::Finish { .. }) => break,
            Err(e) => return Ok(StreamEnd::Failed(e)),
        }
    }

    Ok(if view.is_empty() {
        StreamEnd::Empty
    } else {
        StreamEnd::Completed
    })
}

/// Show a skeleton, evaluate the call, log the call/result pair atomically
/// and resolve the segment to the result view.
///
/// Text streamed before the call is logged first, so the log keeps the
/// order the reply rendered in.
async fn run_tool(
    config: &DispatchConfig,
    turn: &Turn,
    view: &mut ReplyView<'_>,
    id: String,
    name: String,
    input: serde_json::Value,
) -> Result<(), TailError> {
    if let Some(text) = view.finish_text()?.filter(|t| !t.is_empty()) {
        turn.append([LogEntry::assistant(text)])?;
    }

    let segment = StreamableUi::new(render::tool_loading(&ToolKind::from_name(&name)));
    view.push_segment(UiNode::live(segment.reader()))?;

    tokio::time::sleep(config.tool_latency).await;
    let evaluation = tools::evaluate(&name, &input);

    let call_id = if id.is_empty() { new_id() } else { id };
    let mut entries = vec![
        LogEntry::tool_call(call_id.clone(), name.clone(), input),
        LogEntry::tool_result(call_id, name.clone(), evaluation.output.to_value()),
    ];
    entries.extend(evaluation.note.map(LogEntry::system));
    turn.append(entries)?;

    segment.done(Some(evaluation.view))?;
    tracing::info!(tool = %name, "Tool call resolved");
    Ok(())
}

/// Log the reply and return the node the UI settles on. Logging comes
/// first so a settled reader always sees the updated log.
fn finish_reply(
    end: StreamEnd,
    turn: &Turn,
    view: &mut ReplyView<'_>,
) -> Result<UiNode, TailError> {
    match end {
        StreamEnd::Completed => {
            if let Some(text) = view.finish_text()?.filter(|t| !t.is_empty()) {
                turn.append([LogEntry::assistant(text)])?;
            }
            Ok(view.node())
        }
        StreamEnd::Empty => {
            tracing::warn!("Model returned an empty response");
            Ok(UiNode::error(EMPTY_REPLY_MESSAGE))
        }
        StreamEnd::Failed(e) => {
            tracing::warn!(error = %e, kind = ?e.kind, "Model request failed");
            // Partial text stays visible but is not logged
            view.finish_text()?;
            if view.is_empty() {
                Ok(UiNode::error(FAILURE_MESSAGE))
            } else {
                view.segments.push(UiNode::error(FAILURE_MESSAGE));
                Ok(view.node())
            }
        }
    }
}

async fn run_purchase(
    orders: Arc<dyn OrderService>,
    step: Duration,
    turn: Turn,
    purchasing: StreamableUi,
    system_message: StreamableUi,
    order: PurchaseOrder,
) {
    tokio::time::sleep(step).await;
    let progress = UiNode::progress(format!(
        "Purchasing {} {}... working on it...",
        order.quantity, order.item
    ));
    if let Err(e) = purchasing.update(progress) {
        tracing::error!(error = %e, "Purchase aborted");
        turn.release();
        return;
    }

    if let Err(e) = orders.place_order(&order).await {
        tracing::warn!(error = %e, "Order failed");
        turn.release();
        let failed = UiNode::error(format!("Your order could not be placed: {e}"));
        if let Err(e) = purchasing
            .done(Some(failed))
            .and_then(|()| system_message.done(None))
        {
            tracing::error!(error = %e, "Purchase aborted");
        }
        return;
    }

    if let Err(e) = turn.append([LogEntry::system(order.log_line())]) {
        tracing::error!(error = %e, "Purchase aborted");
        return;
    }
    let pending = turn.done_current();

    let total = format_money(order.total());
    let notice = UiNode::notice(format!(
        "You have successfully purchased {} {}. Total cost: {total}",
        order.quantity, order.item
    ));
    let message = UiNode::system_message(format!(
        "You have purchased {} x {} at {}. Total cost = {total}.",
        order.quantity,
        order.item,
        format_money(order.price)
    ));
    if let Err(e) = purchasing
        .done(Some(notice))
        .and_then(|()| system_message.done(Some(message)))
    {
        tracing::error!(error = %e, "Purchase aborted");
    }

    match pending {
        Ok(pending) => match pending.persist().await {
            Ok(()) => tracing::info!(
                item = %order.item,
                quantity = order.quantity,
                "Purchase committed"
            ),
            Err(e) => tracing::warn!(error = %e, "Purchase commit failed"),
        },
        Err(e) => tracing::warn!(error = %e, "Purchase commit failed"),
    }
}
