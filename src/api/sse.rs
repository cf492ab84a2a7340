//! Server-Sent Events for live UI nodes

use super::types::{NodeUpdate, TurnEvent};
use crate::streamable::{Snapshot, StreamReader};
use crate::ui::UiNode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::convert::Infallible;
use std::time::Duration;

/// Live children publish on their own channels; poll for their changes.
const LIVE_POLL: Duration = Duration::from_millis(50);

struct Follow {
    updates: BoxStream<'static, Snapshot<UiNode>>,
    reader: StreamReader<UiNode>,
    last: Option<Value>,
    finished: bool,
}

/// Serialized snapshots of `reader`, emitted whenever the node or any live
/// child changes and ending with the done snapshot.
pub fn follow_node(reader: StreamReader<UiNode>) -> impl Stream<Item = NodeUpdate> + Send {
    let state = Follow {
        updates: reader.updates().boxed(),
        reader,
        last: None,
        finished: false,
    };
    stream::unfold(state, |mut s| async move {
        if s.finished {
            return None;
        }
        loop {
            let snapshot = tokio::select! {
                next = s.updates.next() => next?,
                () = tokio::time::sleep(LIVE_POLL) => s.reader.snapshot(),
            };
            let done = snapshot.is_done();
            let node = serde_json::to_value(&snapshot.value).unwrap_or(Value::Null);
            if done || s.last.as_ref() != Some(&node) {
                s.last = Some(node.clone());
                s.finished = done;
                return Some((NodeUpdate { node, done }, s));
            }
        }
    })
}

/// `turn` event followed by `update` events for the reply node
pub fn turn_stream(
    id: String,
    display: StreamReader<UiNode>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let head = stream::once(async move { json_event("turn", &TurnEvent { id }) });
    let updates = follow_node(display).map(|update| json_event("update", &update));
    sse(head.chain(updates))
}

/// `turn` event, then `purchasing` and `message` events interleaved as the
/// two handles change
pub fn purchase_stream(
    id: String,
    purchasing: StreamReader<UiNode>,
    message: StreamReader<UiNode>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let head = stream::once(async move { json_event("turn", &TurnEvent { id }) });
    let purchasing = follow_node(purchasing).map(|update| json_event("purchasing", &update));
    let message = follow_node(message).map(|update| json_event("message", &update));
    sse(head.chain(stream::select(purchasing, message)))
}

fn sse<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = Event> + Send + 'static,
{
    Sse::new(events.map(Ok)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn json_event(name: &str, data: &impl Serialize) -> Event {
    let data = serde_json::to_string(data).unwrap_or_else(|_| "null".to_string());
    Event::default().event(name).data(data)
}
