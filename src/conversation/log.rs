//! Snapshot-and-replace log with an exclusive turn guard

use super::{Conversation, LogEntry};
use crate::runtime::PersistenceError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("a turn is already in progress for this session")]
    TurnInProgress,
    #[error("snapshot belongs to session {found}, expected {expected}")]
    SessionMismatch { expected: String, found: String },
    #[error("log would shrink from {from} to {to} entries")]
    Truncated { from: usize, to: usize },
    #[error("entry {index} was committed before this turn and cannot change")]
    RewrittenEntry { index: usize },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Invoked with the committed snapshot at the end of every turn
#[async_trait]
pub trait CommitHook: Send + Sync {
    async fn on_commit(&self, conversation: &Conversation) -> Result<(), PersistenceError>;
}

/// Hook that keeps everything in memory
#[cfg(test)]
pub struct NoopCommitHook;

#[cfg(test)]
#[async_trait]
impl CommitHook for NoopCommitHook {
    async fn on_commit(&self, _conversation: &Conversation) -> Result<(), PersistenceError> {
        Ok(())
    }
}

pub struct ConversationLog {
    session_id: String,
    current: RwLock<Arc<Conversation>>,
    turn_lock: Arc<Mutex<()>>,
    hook: Arc<dyn CommitHook>,
    /// Generation of the latest finished turn
    finished: AtomicU64,
    /// Generation of the latest snapshot the hook accepted
    persisted: Mutex<u64>,
}

impl ConversationLog {
    pub fn new(conversation: Conversation, hook: Arc<dyn CommitHook>) -> Self {
        Self {
            session_id: conversation.session_id.clone(),
            current: RwLock::new(Arc::new(conversation)),
            turn_lock: Arc::new(Mutex::new(())),
            hook,
            finished: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current snapshot
    pub fn get(&self) -> Arc<Conversation> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.turn_lock.try_lock().is_err()
    }

    /// Take exclusive write access for one turn.
    ///
    /// Overlapping turns are rejected, never queued.
    pub fn begin_turn(self: &Arc<Self>) -> Result<Turn, LogError> {
        let guard = self
            .turn_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| LogError::TurnInProgress)?;
        let base_len = self.get().len();
        Ok(Turn {
            log: Arc::clone(self),
            _guard: guard,
            base_len,
            finished: false,
        })
    }

    /// Validate `next` against the current snapshot and swap it in.
    fn replace(
        &self,
        next: Conversation,
        base_len: usize,
        finalize: bool,
    ) -> Result<Arc<Conversation>, LogError> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        check_successor(&current, &next, base_len, finalize)?;
        let next = Arc::new(next);
        *current = Arc::clone(&next);
        Ok(next)
    }
}

/// A successor keeps the session, never shrinks and never edits entries
/// committed before the turn. When finalizing, the last entry may be
/// swapped if this turn appended it.
fn check_successor(
    current: &Conversation,
    next: &Conversation,
    base_len: usize,
    finalize: bool,
) -> Result<(), LogError> {
    if next.session_id != current.session_id {
        return Err(LogError::SessionMismatch {
            expected: current.session_id.clone(),
            found: next.session_id.clone(),
        });
    }
    if next.len() < current.len() {
        return Err(LogError::Truncated {
            from: current.len(),
            to: next.len(),
        });
    }
    let tail = current.len().checked_sub(1);
    for (index, (before, after)) in current.entries.iter().zip(&next.entries).enumerate() {
        if before == after {
            continue;
        }
        let replaceable = finalize && Some(index) == tail && index >= base_len;
        if !replaceable {
            return Err(LogError::RewrittenEntry { index });
        }
    }
    Ok(())
}

/// Exclusive write access to a log for the duration of one turn
pub struct Turn {
    log: Arc<ConversationLog>,
    _guard: OwnedMutexGuard<()>,
    base_len: usize,
    finished: bool,
}

impl Turn {
    pub fn get(&self) -> Arc<Conversation> {
        self.log.get()
    }

    /// Replace the snapshot without committing.
    pub fn update(&self, next: Conversation) -> Result<(), LogError> {
        self.log.replace(next, self.base_len, false).map(|_| ())
    }

    pub fn append(&self, entries: impl IntoIterator<Item = LogEntry>) -> Result<(), LogError> {
        self.update(self.get().with_appended(entries))
    }

    /// Replace the snapshot and end the turn.
    ///
    /// The log accepts the next turn as soon as this returns. The returned
    /// commit still has to be persisted.
    pub fn done(mut self, next: Conversation) -> Result<PendingCommit, LogError> {
        self.finished = true;
        let snapshot = self.log.replace(next, self.base_len, true)?;
        let generation = self.log.finished.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PendingCommit {
            log: Arc::clone(&self.log),
            snapshot,
            generation,
        })
    }

    /// End the turn with the current snapshot as is.
    pub fn done_current(self) -> Result<PendingCommit, LogError> {
        let next = (*self.get()).clone();
        self.done(next)
    }

    /// Append, end the turn and persist.
    #[cfg(test)]
    pub async fn commit_append(
        self,
        entries: impl IntoIterator<Item = LogEntry>,
    ) -> Result<(), LogError> {
        let next = self.get().with_appended(entries);
        self.done(next)?.persist().await
    }

    /// End the turn with the current snapshot and persist.
    #[cfg(test)]
    pub async fn commit(self) -> Result<(), LogError> {
        self.done_current()?.persist().await
    }

    /// End the turn without committing. Appended entries stay in memory.
    pub fn release(mut self) {
        self.finished = true;
        tracing::debug!(session_id = %self.log.session_id(), "Turn released");
    }
}

/// Snapshot of a finished turn waiting for the commit hook
pub struct PendingCommit {
    log: Arc<ConversationLog>,
    snapshot: Arc<Conversation>,
    generation: u64,
}

impl PendingCommit {
    /// Run the commit hook.
    ///
    /// Hook calls are serialized per log, and a snapshot older than one
    /// already persisted is skipped, so storage never moves backwards.
    pub async fn persist(self) -> Result<(), LogError> {
        let mut persisted = self.log.persisted.lock().await;
        if *persisted >= self.generation {
            tracing::debug!(
                session_id = %self.snapshot.session_id,
                generation = self.generation,
                "Newer snapshot already persisted"
            );
            return Ok(());
        }
        tracing::debug!(
            session_id = %self.snapshot.session_id,
            entries = self.snapshot.len(),
            "Committing conversation"
        );
        self.log.hook.on_commit(&self.snapshot).await?;
        *persisted = self.generation;
        Ok(())
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                session_id = %self.log.session_id(),
                "Turn released without commit"
            );
        }
    }
}
