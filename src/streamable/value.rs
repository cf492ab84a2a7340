//! Streamable data values

use super::{Slot, StreamClosedError, StreamReader, StreamStatus};
use serde_json::Value;

/// How a partial update folds into the current value
pub trait Accumulate: Clone + Send + Sync + 'static {
    fn accumulate(&mut self, delta: Self);
}

impl Accumulate for String {
    fn accumulate(&mut self, delta: Self) {
        self.push_str(&delta);
    }
}

impl<T: Clone + Send + Sync + 'static> Accumulate for Vec<T> {
    fn accumulate(&mut self, delta: Self) {
        self.extend(delta);
    }
}

/// Objects merge key by key; everything else is replaced.
impl Accumulate for Value {
    fn accumulate(&mut self, delta: Self) {
        match (self, delta) {
            (Value::Object(current), Value::Object(patch)) => current.extend(patch),
            (current, delta) => *current = delta,
        }
    }
}

/// Single-writer handle for an evolving piece of data
pub struct StreamableValue<T: Accumulate> {
    slot: Slot<T>,
}

impl<T: Accumulate + Default> StreamableValue<T> {
    pub fn new() -> Self {
        Self::with_initial(T::default())
    }
}

impl<T: Accumulate + Default> Default for StreamableValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Accumulate> StreamableValue<T> {
    pub fn with_initial(initial: T) -> Self {
        Self {
            slot: Slot::new(initial),
        }
    }

    /// Merge `delta` into the current value and notify readers.
    pub fn update(&self, delta: T) -> Result<(), StreamClosedError> {
        self.slot.write(|value| value.accumulate(delta), false)
    }

    /// Finish the stream, optionally replacing the accumulated value.
    pub fn done(&self, final_value: Option<T>) -> Result<(), StreamClosedError> {
        self.slot.write(
            |value| {
                if let Some(final_value) = final_value {
                    *value = final_value;
                }
            },
            true,
        )
    }

    pub fn reader(&self) -> StreamReader<T> {
        self.slot.reader()
    }

    pub fn status(&self) -> StreamStatus {
        self.slot.status()
    }
}

impl<T: Accumulate> Drop for StreamableValue<T> {
    fn drop(&mut self) {
        if self.slot.status() == StreamStatus::Open {
            tracing::debug!("Streamable value dropped while open, keeping accumulated value");
            let _ = self.done(None);
        }
    }
}
