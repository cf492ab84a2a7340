//! Session container: one conversation log wired to identity and storage

use super::traits::{ChatStore, Identity, IdentityProvider, PersistenceError};
use crate::conversation::{CommitHook, Conversation, ConversationLog};
use crate::db::ChatRecord;
use crate::display::{project, DisplayEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifecycle hooks shared by the session and its log
struct SessionHooks {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn ChatStore>,
    created_at: DateTime<Utc>,
}

impl SessionHooks {
    async fn persist(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        let Some(identity) = self.identity.current_identity() else {
            tracing::debug!(session_id = %conversation.session_id, "No identity, skipping save");
            return Ok(());
        };
        if conversation.is_empty() {
            return Ok(());
        }
        let record = ChatRecord::from_conversation(conversation, identity.user_id, self.created_at);
        self.store.save_chat(&record).await?;
        tracing::info!(
            session_id = %conversation.session_id,
            entries = conversation.len(),
            "Chat saved"
        );
        Ok(())
    }
}

#[async_trait]
impl CommitHook for SessionHooks {
    async fn on_commit(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        self.persist(conversation).await
    }
}

/// Explicit per-session context passed to every dispatcher call
pub struct SessionContext {
    log: Arc<ConversationLog>,
    hooks: Arc<SessionHooks>,
}

impl SessionContext {
    /// A new, empty chat
    pub fn new(identity: Arc<dyn IdentityProvider>, store: Arc<dyn ChatStore>) -> Self {
        Self::with_conversation(Conversation::fresh(), Utc::now(), identity, store)
    }

    pub fn with_conversation(
        conversation: Conversation,
        created_at: DateTime<Utc>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        let hooks = Arc::new(SessionHooks {
            identity,
            store,
            created_at,
        });
        let log = Arc::new(ConversationLog::new(conversation, hooks.clone()));
        Self { log, hooks }
    }

    /// Rebuild a session from its stored record
    pub fn resume(
        record: &ChatRecord,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ChatStore>,
    ) -> Self {
        Self::with_conversation(record.to_conversation(), record.created_at, identity, store)
    }

    pub fn session_id(&self) -> &str {
        self.log.session_id()
    }

    pub fn log(&self) -> &Arc<ConversationLog> {
        &self.log
    }

    pub fn identity(&self) -> Option<Identity> {
        self.hooks.identity.current_identity()
    }

    #[cfg(test)]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.hooks.created_at
    }

    /// Display state for a returning client.
    ///
    /// `None` means there is no identity, which is distinct from an empty
    /// chat (`Some(vec![])`). The live log wins when it extends the stored
    /// record, so a failed save does not hide entries still in memory.
    pub async fn on_resume_display_state(
        &self,
    ) -> Result<Option<Vec<DisplayEntry>>, PersistenceError> {
        let Some(identity) = self.identity() else {
            return Ok(None);
        };
        let stored = self
            .hooks
            .store
            .load_chat(&identity.user_id, self.session_id())
            .await?;
        let live = self.log.get();
        let display = match stored.as_ref().map(ChatRecord::to_conversation) {
            Some(saved) if !live.entries.starts_with(&saved.entries) => project(&saved),
            _ => project(&live),
        };
        Ok(Some(display))
    }

    /// Persist `conversation` for the current identity. No-op without one.
    ///
    /// Turns reach the same path through the log's commit hook.
    #[cfg(test)]
    pub async fn on_commit(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        self.hooks.persist(conversation).await
    }
}

type SessionKey = (Option<String>, String);

/// Live sessions keyed by owner and chat id
pub struct SessionRegistry {
    store: Arc<dyn ChatStore>,
    sessions: RwLock<HashMap<SessionKey, Arc<SessionContext>>>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub async fn create(&self, identity: Option<Identity>) -> Arc<SessionContext> {
        let owner = identity.as_ref().map(|i| i.user_id.clone());
        let provider = Arc::new(super::FixedIdentity::from_option(identity));
        let session = Arc::new(SessionContext::new(provider, self.store.clone()));
        let key = (owner, session.session_id().to_string());
        self.sessions.write().await.insert(key, session.clone());
        tracing::info!(session_id = %session.session_id(), "Chat created");
        session
    }

    /// Find a live session or restore it from storage.
    pub async fn get_or_restore(
        &self,
        identity: Option<Identity>,
        chat_id: &str,
    ) -> Result<Option<Arc<SessionContext>>, PersistenceError> {
        let key = (
            identity.as_ref().map(|i| i.user_id.clone()),
            chat_id.to_string(),
        );
        if let Some(session) = self.sessions.read().await.get(&key) {
            return Ok(Some(session.clone()));
        }

        let Some(user) = identity.clone() else {
            return Ok(None);
        };
        let Some(record) = self.store.load_chat(&user.user_id, chat_id).await? else {
            return Ok(None);
        };

        let provider = Arc::new(super::FixedIdentity::from_option(identity));
        let mut sessions = self.sessions.write().await;
        // Another request may have restored it while we were loading
        let session = sessions
            .entry(key)
            .or_insert_with(|| {
                Arc::new(SessionContext::resume(
                    &record,
                    provider,
                    self.store.clone(),
                ))
            })
            .clone();
        tracing::info!(
            session_id = %chat_id,
            entries = record.messages.len(),
            "Chat restored"
        );
        Ok(Some(session))
    }

    /// Delete a stored chat and drop its live session.
    pub async fn delete(
        &self,
        identity: &Identity,
        chat_id: &str,
    ) -> Result<bool, PersistenceError> {
        let removed = self.store.delete_chat(&identity.user_id, chat_id).await?;
        let key = (Some(identity.user_id.clone()), chat_id.to_string());
        let live = self.sessions.write().await.remove(&key).is_some();
        if removed || live {
            tracing::info!(session_id = %chat_id, "Chat deleted");
        }
        Ok(removed || live)
    }
}
