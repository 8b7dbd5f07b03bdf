//! Task state values.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncRead;

/// A readable byte stream stored in task state.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

enum StreamState {
  Open(BoxedReader),
  Taken,
  Closed,
}

/// A shared, single-shot handle to a readable byte stream.
///
/// Stages pass clones of the handle around through task state; the stream
/// itself can leave the handle only once, either by a consumer taking the
/// reader or by [`close`](StreamHandle::close) releasing it. Closing an
/// already-taken or already-closed handle is a no-op, so a stream is
/// released exactly once across its lifetime regardless of how many
/// clones exist.
#[derive(Clone)]
pub struct StreamHandle {
  state: Arc<Mutex<StreamState>>,
}

impl StreamHandle {
  pub fn new(reader: BoxedReader) -> Self {
    Self {
      state: Arc::new(Mutex::new(StreamState::Open(reader))),
    }
  }

  /// Transfer the reader out of the handle.
  ///
  /// Returns `None` if the reader was already taken or the handle closed.
  pub fn take_reader(&self) -> Option<BoxedReader> {
    let mut state = self.state.lock().expect("stream handle lock poisoned");
    match std::mem::replace(&mut *state, StreamState::Taken) {
      StreamState::Open(reader) => Some(reader),
      StreamState::Taken => None,
      StreamState::Closed => {
        *state = StreamState::Closed;
        None
      }
    }
  }

  /// Close the handle, releasing the underlying stream if it is still held.
  ///
  /// Idempotent; closing after the reader was taken only marks the handle
  /// closed (the consumer owns the reader's release at that point).
  pub fn close(&self) {
    let mut state = self.state.lock().expect("stream handle lock poisoned");
    *state = StreamState::Closed;
  }

  /// Whether [`close`](StreamHandle::close) has been called on any clone.
  pub fn is_closed(&self) -> bool {
    matches!(
      *self.state.lock().expect("stream handle lock poisoned"),
      StreamState::Closed
    )
  }
}

impl fmt::Debug for StreamHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock().expect("stream handle lock poisoned");
    let label = match *state {
      StreamState::Open(_) => "open",
      StreamState::Taken => "taken",
      StreamState::Closed => "closed",
    };
    f.debug_tuple("StreamHandle").field(&label).finish()
  }
}

/// A single task state value.
#[derive(Debug, Clone)]
pub enum TaskValue {
  String(String),
  Int(i64),
  Stream(StreamHandle),
}

impl TaskValue {
  /// Kind name used in error messages.
  pub fn kind(&self) -> &'static str {
    match self {
      TaskValue::String(_) => "a string",
      TaskValue::Int(_) => "an integer",
      TaskValue::Stream(_) => "a byte stream",
    }
  }
}

impl From<&str> for TaskValue {
  fn from(value: &str) -> Self {
    TaskValue::String(value.to_string())
  }
}

impl From<String> for TaskValue {
  fn from(value: String) -> Self {
    TaskValue::String(value)
  }
}

impl From<i64> for TaskValue {
  fn from(value: i64) -> Self {
    TaskValue::Int(value)
  }
}

impl From<StreamHandle> for TaskValue {
  fn from(value: StreamHandle) -> Self {
    TaskValue::Stream(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn take_reader_is_single_shot() {
    let handle = StreamHandle::new(Box::new(std::io::Cursor::new(b"abc".to_vec())));
    assert!(handle.take_reader().is_some());
    assert!(handle.take_reader().is_none());
  }

  #[test]
  fn close_is_idempotent_and_visible_through_clones() {
    let handle = StreamHandle::new(Box::new(std::io::Cursor::new(b"abc".to_vec())));
    let other = handle.clone();
    assert!(!other.is_closed());
    handle.close();
    handle.close();
    assert!(other.is_closed());
    assert!(other.take_reader().is_none());
  }

  #[test]
  fn close_after_take_marks_closed() {
    let handle = StreamHandle::new(Box::new(std::io::Cursor::new(b"abc".to_vec())));
    let reader = handle.take_reader();
    assert!(reader.is_some());
    handle.close();
    assert!(handle.is_closed());
  }
}
