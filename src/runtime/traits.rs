//! Collaborator traits for the orchestration runtime
//!
//! These traits let tests swap persistence, identity and order placement for
//! in-memory mocks.

use super::dispatcher::PurchaseOrder;
use crate::db::{ChatRecord, ChatSummary, Database, DbError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("chat {0} belongs to another user")]
    NotOwner(String),
}

impl From<DbError> for PersistenceError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotOwner(id) => PersistenceError::NotOwner(id),
            other => PersistenceError::Storage(other.to_string()),
        }
    }
}

/// Whole-record chat persistence
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn save_chat(&self, record: &ChatRecord) -> Result<(), PersistenceError>;

    async fn load_chat(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Option<ChatRecord>, PersistenceError>;

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceError>;

    /// Returns whether a chat owned by `user_id` was removed
    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool, PersistenceError>;
}

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Resolves who is making the current request
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// Identity decided up front, e.g. from a request header
#[derive(Debug, Clone, Default)]
pub struct FixedIdentity(Option<Identity>);

impl FixedIdentity {
    #[cfg(test)]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self(Some(Identity::new(user_id)))
    }

    #[cfg(test)]
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn from_option(identity: Option<Identity>) -> Self {
        Self(identity)
    }
}

impl IdentityProvider for FixedIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.0.clone()
    }
}

#[derive(Debug, Error)]
#[error("order failed: {0}")]
pub struct OrderError(pub String);

/// Places confirmed orders
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn place_order(&self, order: &PurchaseOrder) -> Result<(), OrderError>;
}

/// Pretends to place the order after a fixed delay
#[derive(Debug, Clone)]
pub struct SimulatedOrderService {
    latency: Duration,
}

impl SimulatedOrderService {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl OrderService for SimulatedOrderService {
    async fn place_order(&self, order: &PurchaseOrder) -> Result<(), OrderError> {
        tokio::time::sleep(self.latency).await;
        tracing::info!(item = %order.item, quantity = order.quantity, "Order placed");
        Ok(())
    }
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ChatStore + ?Sized> ChatStore for Arc<T> {
    async fn save_chat(&self, record: &ChatRecord) -> Result<(), PersistenceError> {
        (**self).save_chat(record).await
    }

    async fn load_chat(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Option<ChatRecord>, PersistenceError> {
        (**self).load_chat(user_id, chat_id).await
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceError> {
        (**self).list_chats(user_id).await
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool, PersistenceError> {
        (**self).delete_chat(user_id, chat_id).await
    }
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    fn current_identity(&self) -> Option<Identity> {
        (**self).current_identity()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `ChatStore`
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatStore for DatabaseStore {
    async fn save_chat(&self, record: &ChatRecord) -> Result<(), PersistenceError> {
        self.db.save_chat(record).map_err(PersistenceError::from)
    }

    async fn load_chat(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Option<ChatRecord>, PersistenceError> {
        self.db.get_chat(user_id, chat_id).map_err(PersistenceError::from)
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>, PersistenceError> {
        self.db.list_chats(user_id).map_err(PersistenceError::from)
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool, PersistenceError> {
        self.db.delete_chat(user_id, chat_id).map_err(PersistenceError::from)
    }
}
