//! End-to-end turns through the dispatcher with mocked collaborators

use super::testing::{finish, InMemoryChatStore, MockLlmClient, MockOrderService};
use super::*;
use crate::conversation::{Content, ContentPart, LogError, Role};
use crate::display::project;
use crate::llm::{LlmError, MessageRole, StreamPart};
use crate::streamable::StreamStatus;
use crate::tools::INVALID_AMOUNT_NOTE;
use crate::ui::UiNode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    llm: Arc<MockLlmClient>,
    orders: Arc<MockOrderService>,
    store: Arc<InMemoryChatStore>,
    dispatcher: ActionDispatcher,
    session: SessionContext,
}

fn fast_config() -> DispatchConfig {
    DispatchConfig {
        enable_tools: false,
        tool_latency: Duration::ZERO,
        purchase_step: Duration::from_millis(1),
        max_tokens: None,
    }
}

fn harness_with(llm: MockLlmClient, orders: MockOrderService, config: DispatchConfig) -> Harness {
    harness_with_store(llm, orders, InMemoryChatStore::new(), config)
}

fn harness_with_store(
    llm: MockLlmClient,
    orders: MockOrderService,
    store: InMemoryChatStore,
    config: DispatchConfig,
) -> Harness {
    let llm = Arc::new(llm);
    let orders = Arc::new(orders);
    let store = Arc::new(store);
    let dispatcher = ActionDispatcher::new(llm.clone(), orders.clone(), config);
    let session = SessionContext::new(Arc::new(FixedIdentity::user("alex")), store.clone());
    Harness {
        llm,
        orders,
        store,
        dispatcher,
        session,
    }
}

fn harness() -> Harness {
    harness_with(MockLlmClient::new(), MockOrderService::new(), fast_config())
}

fn roles(session: &SessionContext) -> Vec<Role> {
    session.log().get().entries.iter().map(|e| e.role).collect()
}

#[tokio::test]
async fn test_user_message_streams_reply_into_log() {
    let h = harness();
    h.llm.queue_text(&["Hi Alex! ", "Any food preferences?"]);

    let reply = h
        .dispatcher
        .submit_user_message(&h.session, "Hi, I'm Alex")
        .unwrap();

    // The user entry lands before the reply streams
    let log = h.session.log().get();
    assert_eq!(log.len(), 1);
    assert_eq!(log.entries[0].role, Role::User);
    assert_eq!(log.entries[0].text(), Some("Hi, I'm Alex"));
    assert_eq!(reply.display.status(), StreamStatus::Open);

    let node = reply.display.settled().await;
    assert_eq!(node, UiNode::bot_text("Hi Alex! Any food preferences?"));

    let log = h.session.log().get();
    assert_eq!(roles(&h.session), vec![Role::User, Role::Assistant]);
    assert_eq!(log.entries[1].text(), Some("Hi Alex! Any food preferences?"));

    h.dispatcher.drain().await;
    let saved = h.store.get("alex", h.session.session_id()).unwrap();
    assert_eq!(saved.messages.len(), 2);
    assert_eq!(saved.title, "Hi, I'm Alex");
}

#[tokio::test]
async fn test_request_carries_history_and_prompt() {
    let h = harness();
    h.llm.queue_text(&["first"]);
    h.llm.queue_text(&["second"]);

    let first = h.dispatcher.submit_user_message(&h.session, "one").unwrap();
    first.display.settled().await;
    let second = h.dispatcher.submit_user_message(&h.session, "two").unwrap();
    second.display.settled().await;

    let requests = h.llm.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].tools.is_empty());
    assert!(!requests[0].system.is_empty());
    let history: Vec<_> = requests[1].messages.iter().map(|m| m.role).collect();
    assert_eq!(
        history,
        vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
    );
}

#[tokio::test]
async fn test_confirm_purchase_records_one_system_entry() {
    let h = harness();
    let order = PurchaseOrder {
        item: "ITEM123".to_string(),
        price: 8.75,
        quantity: 2,
    };

    let reply = h.dispatcher.confirm_purchase(&h.session, order.clone()).unwrap();
    assert_eq!(reply.purchasing_ui.status(), StreamStatus::Open);
    assert_eq!(reply.new_message.display.status(), StreamStatus::Open);

    let purchasing = reply.purchasing_ui.settled().await.plain_text();
    assert!(purchasing.contains('2'), "{purchasing}");
    assert!(purchasing.contains("17.50"), "{purchasing}");

    let message = reply.new_message.display.settled().await;
    assert!(matches!(message, UiNode::SystemMessage { .. }));

    let log = h.session.log().get();
    assert_eq!(log.len(), 1);
    assert_eq!(log.entries[0].role, Role::System);
    let text = log.entries[0].text().unwrap();
    assert!(text.contains("ITEM123"));
    assert!(text.contains("8.75"));
    assert!(text.contains("17.50"));

    assert_eq!(*h.orders.placed.lock().unwrap(), vec![order]);
    h.dispatcher.drain().await;
    assert_eq!(h.store.save_count(), 1);
}

#[tokio::test]
async fn test_model_failure_renders_error_without_reply_entry() {
    let h = harness();
    h.llm.queue_error(LlmError::server_error("model unavailable"));

    let reply = h.dispatcher.submit_user_message(&h.session, "hello").unwrap();
    let node = reply.display.settled().await;
    assert!(node.is_error());
    assert_eq!(roles(&h.session), vec![Role::User]);

    // The user entry is still committed
    h.dispatcher.drain().await;
    assert_eq!(h.store.get("alex", h.session.session_id()).unwrap().messages.len(), 1);
    assert!(!h.session.log().is_busy());
}

#[tokio::test]
async fn test_resume_display_state_absent_without_identity() {
    let store = Arc::new(InMemoryChatStore::new());
    let anonymous = SessionContext::new(Arc::new(FixedIdentity::anonymous()), store.clone());
    assert!(anonymous.on_resume_display_state().await.unwrap().is_none());

    let owned = SessionContext::new(Arc::new(FixedIdentity::user("alex")), store);
    assert_eq!(owned.on_resume_display_state().await.unwrap(), Some(vec![]));
}

#[tokio::test]
async fn test_overlapping_turn_rejected() {
    let (llm, gate) = MockLlmClient::gated();
    let h = harness_with(llm, MockOrderService::new(), fast_config());
    h.llm.queue_text(&["done"]);

    let first = h.dispatcher.submit_user_message(&h.session, "first").unwrap();
    assert!(matches!(
        h.dispatcher.submit_user_message(&h.session, "second"),
        Err(DispatchError::Log(LogError::TurnInProgress))
    ));
    let order = PurchaseOrder {
        item: "Shroomami".to_string(),
        price: 17.95,
        quantity: 1,
    };
    assert!(matches!(
        h.dispatcher.confirm_purchase(&h.session, order),
        Err(DispatchError::Log(LogError::TurnInProgress))
    ));
    assert_eq!(roles(&h.session), vec![Role::User]);

    gate.notify_one();
    first.display.settled().await;
    h.dispatcher.drain().await;
    assert!(!h.session.log().is_busy());
}

#[tokio::test]
async fn test_blank_message_rejected_before_logging() {
    let h = harness();
    assert!(matches!(
        h.dispatcher.submit_user_message(&h.session, "  \n"),
        Err(DispatchError::EmptyMessage)
    ));
    assert!(h.session.log().get().is_empty());
    assert!(h.llm.recorded_requests().is_empty());
}

#[tokio::test]
async fn test_tool_call_logs_pair_and_renders_card() {
    let config = DispatchConfig {
        enable_tools: true,
        ..fast_config()
    };
    let h = harness_with(MockLlmClient::new(), MockOrderService::new(), config);
    let items = json!({"items": [
        {"name": "Shroomami", "price": 17.95, "description": "Roasted tofu"},
        {"name": "Chicky Chicky", "price": 15.95, "description": "Chicken katsu"}
    ]});
    h.llm.queue_parts(vec![
        Ok(StreamPart::TextDelta("Here is the menu".to_string())),
        Ok(StreamPart::ToolCall {
            id: "call_1".to_string(),
            name: "list_menu_items".to_string(),
            input: items.clone(),
        }),
        Ok(finish()),
    ]);

    let reply = h.dispatcher.submit_user_message(&h.session, "What's good?").unwrap();
    let node = reply.display.settled().await;

    let UiNode::Fragment { children } = node else {
        panic!("expected text followed by a card");
    };
    assert_eq!(children.len(), 2);
    assert_eq!(children[0], UiNode::bot_text("Here is the menu"));
    let UiNode::Live { stream } = &children[1] else {
        panic!("expected a live tool segment");
    };
    assert!(stream.is_done());
    assert!(matches!(
        stream.current(),
        UiNode::BotCard { child } if matches!(*child, UiNode::MenuList { .. })
    ));

    // Text streamed before the call is logged before the call/result pair
    assert_eq!(
        roles(&h.session),
        vec![Role::User, Role::Assistant, Role::Assistant, Role::Tool]
    );
    let log = h.session.log().get();
    assert_eq!(log.entries[1].text(), Some("Here is the menu"));
    assert!(matches!(
        log.entries[2].parts(),
        [ContentPart::ToolCall { tool_call_id, .. }] if tool_call_id == "call_1"
    ));
    assert!(matches!(
        log.entries[3].parts(),
        [ContentPart::ToolResult { tool_call_id, result, .. }]
            if tool_call_id == "call_1" && *result == items
    ));
    assert_eq!(h.llm.recorded_requests()[0].tools.len(), 3);

    // A resumed client sees the text before the card, as it streamed
    let display = project(&log);
    assert_eq!(display[1].node, UiNode::bot_text("Here is the menu"));
    assert_eq!(display.last().unwrap().node, stream.current());
}

#[tokio::test]
async fn test_text_after_tool_call_starts_new_segment() {
    let config = DispatchConfig {
        enable_tools: true,
        ..fast_config()
    };
    let h = harness_with(MockLlmClient::new(), MockOrderService::new(), config);
    h.llm.queue_parts(vec![
        Ok(StreamPart::TextDelta("Let me check".to_string())),
        Ok(StreamPart::ToolCall {
            id: "call_1".to_string(),
            name: "show_menu_item".to_string(),
            input: json!({"name": "Shroomami", "price": 17.95, "description": "Roasted tofu"}),
        }),
        Ok(StreamPart::TextDelta("Enjoy!".to_string())),
        Ok(finish()),
    ]);

    let reply = h.dispatcher.submit_user_message(&h.session, "Shroomami?").unwrap();
    let UiNode::Fragment { children } = reply.display.settled().await else {
        panic!("expected text, card and text");
    };
    assert_eq!(children.len(), 3);
    assert_eq!(children[0], UiNode::bot_text("Let me check"));
    assert_eq!(children[2], UiNode::bot_text("Enjoy!"));

    let log = h.session.log().get();
    assert_eq!(log.entries[1].text(), Some("Let me check"));
    assert_eq!(log.entries.last().unwrap().text(), Some("Enjoy!"));
}

#[tokio::test]
async fn test_invalid_purchase_quantity_adds_note() {
    let config = DispatchConfig {
        enable_tools: true,
        ..fast_config()
    };
    let h = harness_with(MockLlmClient::new(), MockOrderService::new(), config);
    h.llm.queue_parts(vec![
        Ok(StreamPart::ToolCall {
            id: "call_1".to_string(),
            name: "show_purchase".to_string(),
            input: json!({"item": "Shroomami", "price": 17.95, "quantity": 5000}),
        }),
        Ok(finish()),
    ]);

    let reply = h.dispatcher.submit_user_message(&h.session, "5000 please").unwrap();
    let node = reply.display.settled().await;
    assert_eq!(node.plain_text(), "Invalid amount");

    let log = h.session.log().get();
    assert_eq!(
        roles(&h.session),
        vec![Role::User, Role::Assistant, Role::Tool, Role::System]
    );
    assert_eq!(log.entries[3].content, Content::Text(INVALID_AMOUNT_NOTE.to_string()));
}

#[tokio::test]
async fn test_tool_calls_ignored_when_disabled() {
    let h = harness();
    h.llm.queue_parts(vec![
        Ok(StreamPart::TextDelta("Sure".to_string())),
        Ok(StreamPart::ToolCall {
            id: "call_1".to_string(),
            name: "list_menu_items".to_string(),
            input: json!({"items": []}),
        }),
        Ok(finish()),
    ]);

    let reply = h.dispatcher.submit_user_message(&h.session, "menu").unwrap();
    assert_eq!(reply.display.settled().await, UiNode::bot_text("Sure"));
    assert_eq!(roles(&h.session), vec![Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_partial_text_out_of_log() {
    let h = harness();
    h.llm.queue_parts(vec![
        Ok(StreamPart::TextDelta("Partial".to_string())),
        Err(LlmError::network("connection reset")),
    ]);

    let reply = h.dispatcher.submit_user_message(&h.session, "hello").unwrap();
    let UiNode::Fragment { children } = reply.display.settled().await else {
        panic!("expected partial text followed by an error");
    };
    assert_eq!(children[0], UiNode::bot_text("Partial"));
    assert!(children[1].is_error());
    assert_eq!(roles(&h.session), vec![Role::User]);
}

#[tokio::test]
async fn test_empty_model_response_renders_error() {
    let h = harness();
    h.llm.queue_parts(vec![Ok(finish())]);

    let reply = h.dispatcher.submit_user_message(&h.session, "hello").unwrap();
    assert!(reply.display.settled().await.is_error());
    assert_eq!(roles(&h.session), vec![Role::User]);
}

#[tokio::test]
async fn test_failed_order_leaves_log_untouched() {
    let h = harness_with(
        MockLlmClient::new(),
        MockOrderService::failing("card declined"),
        fast_config(),
    );
    let order = PurchaseOrder {
        item: "ITEM123".to_string(),
        price: 8.75,
        quantity: 2,
    };

    let reply = h.dispatcher.confirm_purchase(&h.session, order).unwrap();
    assert!(reply.purchasing_ui.settled().await.is_error());
    assert_eq!(reply.new_message.display.settled().await, UiNode::Empty);

    h.dispatcher.drain().await;
    assert!(h.session.log().get().is_empty());
    assert!(!h.session.log().is_busy());
    assert_eq!(h.store.save_count(), 0);
}

#[tokio::test]
async fn test_invalid_order_rejected_synchronously() {
    let h = harness();
    let order = PurchaseOrder {
        item: "ITEM123".to_string(),
        price: 8.75,
        quantity: 0,
    };
    assert!(matches!(
        h.dispatcher.confirm_purchase(&h.session, order),
        Err(DispatchError::InvalidOrder(_))
    ));
    assert!(!h.session.log().is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_next_message_accepted_once_reply_settles() {
    let h = harness_with_store(
        MockLlmClient::new(),
        MockOrderService::new(),
        InMemoryChatStore::slow(Duration::from_millis(200)),
        fast_config(),
    );
    h.llm.queue_text(&["one"]);
    h.llm.queue_text(&["two"]);

    let first = h.dispatcher.submit_user_message(&h.session, "a").unwrap();
    first.display.settled().await;
    // The first save is still in flight
    let second = h
        .dispatcher
        .submit_user_message(&h.session, "b")
        .expect("turn is free once the reply settles");
    assert_eq!(second.display.settled().await, UiNode::bot_text("two"));

    h.dispatcher.drain().await;
    let saved = h.store.get("alex", h.session.session_id()).unwrap();
    assert_eq!(saved.messages.len(), 4);
}

#[tokio::test]
async fn test_resume_shows_memory_state_after_failed_save() {
    let h = harness_with_store(
        MockLlmClient::new(),
        MockOrderService::new(),
        InMemoryChatStore::failing_after(1),
        fast_config(),
    );
    h.llm.queue_text(&["Hello Alex"]);
    h.llm.queue_text(&["Noted"]);

    for message in ["Hi, I'm Alex", "No mushrooms please"] {
        let reply = h.dispatcher.submit_user_message(&h.session, message).unwrap();
        reply.display.settled().await;
        h.dispatcher.drain().await;
    }

    let saved = h.store.get("alex", h.session.session_id()).unwrap();
    assert_eq!(saved.messages.len(), 2);

    let shown = h.session.on_resume_display_state().await.unwrap().unwrap();
    assert_eq!(shown, project(&h.session.log().get()));
    assert_eq!(shown.len(), 4);
    assert_eq!(shown[3].node, UiNode::bot_text("Noted"));
}
