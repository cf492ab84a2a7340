//! Incrementally updated values observed by many readers
//!
//! A handle has exactly one writer and moves from open to done once.
//! Readers hold a [`StreamReader`] and always see the latest published
//! snapshot, settling on the done value.

mod ui;
mod value;


pub use ui::StreamableUi;
pub use value::StreamableValue;

use futures::stream::Stream;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::watch;

/// Mutation attempted on a handle that already finished
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("stream handle is already done")]
pub struct StreamClosedError;

/// Lifecycle of a stream handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Open,
    Done,
}

/// A published value together with its lifecycle state
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot<T> {
    pub value: T,
    pub status: StreamStatus,
    /// Number of writes applied so far
    pub version: u64,
}

impl<T> Snapshot<T> {
    pub fn is_done(&self) -> bool {
        self.status == StreamStatus::Done
    }
}

/// Write side shared by value and UI handles
struct Slot<T> {
    tx: watch::Sender<Snapshot<T>>,
}

impl<T> Slot<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn new(initial: T) -> Self {
        let (tx, _) = watch::channel(Snapshot {
            value: initial,
            status: StreamStatus::Open,
            version: 0,
        });
        Self { tx }
    }

    /// Apply `write` to the current value, optionally finishing the stream.
    ///
    /// The closed check and the write happen under the same lock, so a
    /// concurrent `done` can never be followed by a visible update.
    fn write(&self, write: impl FnOnce(&mut T), finish: bool) -> Result<(), StreamClosedError> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|snapshot| {
            if snapshot.is_done() {
                outcome = Err(StreamClosedError);
                return false;
            }
            write(&mut snapshot.value);
            snapshot.version += 1;
            if finish {
                snapshot.status = StreamStatus::Done;
            }
            true
        });
        outcome
    }

    fn status(&self) -> StreamStatus {
        self.tx.borrow().status
    }

    fn reader(&self) -> StreamReader<T> {
        StreamReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Read side of a stream handle
#[derive(Debug, Clone)]
pub struct StreamReader<T> {
    rx: watch::Receiver<Snapshot<T>>,
}

impl<T> StreamReader<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot<T> {
        self.rx.borrow().clone()
    }

    /// Latest published value
    pub fn current(&self) -> T {
        self.rx.borrow().value.clone()
    }

    pub fn status(&self) -> StreamStatus {
        self.rx.borrow().status
    }

    pub fn is_done(&self) -> bool {
        self.status() == StreamStatus::Done
    }

    /// Wait until the writer finishes and return the terminal value.
    pub async fn settled(&self) -> T {
        let mut rx = self.rx.clone();
        let settled = rx
            .wait_for(Snapshot::is_done)
            .await
            .map(|snapshot| snapshot.value.clone());
        match settled {
            Ok(value) => value,
            // Writers finalize on drop, so this only happens if the channel
            // closed without a terminal snapshot.
            Err(_) => rx.borrow().value.clone(),
        }
    }

    /// Stream of snapshots: the current one first, then every observed
    /// change, ending after the done snapshot.
    ///
    /// Intermediate snapshots may be coalesced for slow consumers but are
    /// always delivered in write order.
    pub fn updates(&self) -> impl Stream<Item = Snapshot<T>> + Send + 'static {
        futures::stream::unfold(
            (self.rx.clone(), true, false),
            |(mut rx, first, finished)| async move {
                if finished {
                    return None;
                }
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                let snapshot = rx.borrow_and_update().clone();
                let done = snapshot.is_done();
                Some((snapshot, (rx, false, done)))
            },
        )
    }
}

impl<T> PartialEq for StreamReader<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        let mine = self.snapshot();
        let theirs = other.snapshot();
        mine.status == theirs.status && mine.value == theirs.value
    }
}

impl<T> Serialize for StreamReader<T>
where
    T: Clone + Serialize + Send + Sync + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}
