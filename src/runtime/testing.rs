//! Mock implementations for testing
//!
//! These mocks enable dispatcher and API tests without a model, a database
//! or real order placement.

use super::dispatcher::PurchaseOrder;
use super::traits::*;
use crate::db::{ChatRecord, ChatSummary};
use crate::llm::{LlmError, LlmRequest, LlmService, LlmStream, StreamPart, Usage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

// ============================================================================
// Mock LLM Client
// ============================================================================

enum Script {
    Parts(Vec<Result<StreamPart, LlmError>>),
    Fail(LlmError),
}

/// Mock model that replays queued responses
pub struct MockLlmClient {
    scripts: Mutex<VecDeque<Script>>,
    gate: Option<Arc<Notify>>,
    model_id: String,
    /// Record of all requests made
    pub requests: Mutex<Vec<LlmRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            gate: None,
            model_id: "mock-model".to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Hold every request until the returned gate is notified once per request
    pub fn gated() -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let client = Self {
            gate: Some(gate.clone()),
            ..Self::new()
        };
        (client, gate)
    }

    /// Queue a reply streamed as the given text chunks
    pub fn queue_text(&self, chunks: &[&str]) {
        let mut parts: Vec<_> = chunks
            .iter()
            .map(|c| Ok(StreamPart::TextDelta((*c).to_string())))
            .collect();
        parts.push(Ok(finish()));
        self.queue_parts(parts);
    }

    pub fn queue_parts(&self, parts: Vec<Result<StreamPart, LlmError>>) {
        self.scripts.lock().unwrap().push_back(Script::Parts(parts));
    }

    /// Queue a failure before any output
    pub fn queue_error(&self, error: LlmError) {
        self.scripts.lock().unwrap().push_back(Script::Fail(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn finish() -> StreamPart {
    StreamPart::Finish {
        usage: Usage::default(),
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(Script::Parts(parts)) => Ok(Box::pin(futures::stream::iter(parts))),
            Some(Script::Fail(e)) => Err(e),
            None => Err(LlmError::network("No mock response queued")),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Chat Store
// ============================================================================

/// Chat store backed by a map, enforcing ownership like the database
#[derive(Default)]
pub struct InMemoryChatStore {
    chats: Mutex<HashMap<String, ChatRecord>>,
    saves: AtomicUsize,
    save_delay: Duration,
    save_limit: Option<usize>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every save takes `delay` before it lands
    pub fn slow(delay: Duration) -> Self {
        Self {
            save_delay: delay,
            ..Self::default()
        }
    }

    /// Accept `saves` saves, then fail every later one
    pub fn failing_after(saves: usize) -> Self {
        Self {
            save_limit: Some(saves),
            ..Self::default()
        }
    }

    pub fn get(&self, user_id: &str, chat_id: &str) -> Option<ChatRecord> {
        self.chats
            .lock()
            .unwrap()
            .get(chat_id)
            .filter(|r| r.user_id == user_id)
            .cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn save_chat(&self, record: &ChatRecord) -> Result<(), PersistenceError> {
        if !self.save_delay.is_zero() {
            tokio::time::sleep(self.save_delay).await;
        }
        if self
            .save_limit
            .is_some_and(|limit| self.saves.load(Ordering::SeqCst) >= limit)
        {
            return Err(PersistenceError::Storage("disk full".to_string()));
        }
        let mut chats = self.chats.lock().unwrap();
        if chats
            .get(&record.id)
            .is_some_and(|existing| existing.user_id != record.user_id)
        {
            return Err(PersistenceError::NotOwner(record.id.clone()));
        }
        chats.insert(record.id.clone(), record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_chat(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Option<ChatRecord>, PersistenceError> {
        Ok(self.get(user_id, chat_id))
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceError> {
        let mut summaries: Vec<_> = self
            .chats
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| ChatSummary {
                id: r.id.clone(),
                title: r.title.clone(),
                path: r.path.clone(),
                created_at: r.created_at,
                updated_at: r.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool, PersistenceError> {
        let mut chats = self.chats.lock().unwrap();
        if chats.get(chat_id).is_some_and(|r| r.user_id == user_id) {
            chats.remove(chat_id);
            return Ok(true);
        }
        Ok(false)
    }
}

/// Store whose every call fails
pub struct FailingChatStore;

#[async_trait]
impl ChatStore for FailingChatStore {
    async fn save_chat(&self, _record: &ChatRecord) -> Result<(), PersistenceError> {
        Err(PersistenceError::Storage("store offline".to_string()))
    }

    async fn load_chat(
        &self,
        _user_id: &str,
        _chat_id: &str,
    ) -> Result<Option<ChatRecord>, PersistenceError> {
        Err(PersistenceError::Storage("store offline".to_string()))
    }

    async fn list_chats(&self, _user_id: &str) -> Result<Vec<ChatSummary>, PersistenceError> {
        Err(PersistenceError::Storage("store offline".to_string()))
    }

    async fn delete_chat(&self, _user_id: &str, _chat_id: &str) -> Result<bool, PersistenceError> {
        Err(PersistenceError::Storage("store offline".to_string()))
    }
}

// ============================================================================
// Mock Order Service
// ============================================================================

/// Records orders instead of placing them
#[derive(Default)]
pub struct MockOrderService {
    fail_with: Option<String>,
    pub placed: Mutex<Vec<PurchaseOrder>>,
}

impl MockOrderService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_with: Some(reason.into()),
            placed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl OrderService for MockOrderService {
    async fn place_order(&self, order: &PurchaseOrder) -> Result<(), OrderError> {
        if let Some(reason) = &self.fail_with {
            return Err(OrderError(reason.clone()));
        }
        self.placed.lock().unwrap().push(order.clone());
        Ok(())
    }
}
