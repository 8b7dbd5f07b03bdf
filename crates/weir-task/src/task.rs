//! The task handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::value::{StreamHandle, TaskValue};

/// Classification attached to a task error.
///
/// Downstream stages branch on the classification, not on the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskResultCode {
  /// A configured input field is absent or of the wrong kind.
  MissingInput,
  /// A transport-level failure: connection, DNS, TLS handshake, timeout.
  ServiceUnavailable,
  /// The task's cancellation signal fired while the stage was running.
  TaskCancelled,
  /// A stage failed internally: request construction, contract violation,
  /// state publication.
  InternalServerError,
}

/// Final status handed to finish callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
  Finished,
  Cancelled,
}

/// The error recorded on a task, with its classification.
#[derive(Debug, Clone)]
pub struct TaskFailure {
  pub message: String,
  pub code: TaskResultCode,
}

type FinishedCallback = Box<dyn Fn(&Task, TaskStatus) + Send + Sync>;

struct TaskInner {
  state: Mutex<HashMap<String, TaskValue>>,
  failure: Mutex<Option<TaskFailure>>,
  cancel: CancellationToken,
  cancel_cause: Mutex<Option<String>>,
  callbacks: Mutex<HashMap<String, FinishedCallback>>,
  finished: AtomicBool,
}

/// A unit of pipeline work.
///
/// `Task` is a cheap clonable handle; all clones observe the same state,
/// cancellation signal, error slot, and callback registry.
#[derive(Clone)]
pub struct Task {
  inner: Arc<TaskInner>,
}

impl Default for Task {
  fn default() -> Self {
    Self::new()
  }
}

impl Task {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(TaskInner {
        state: Mutex::new(HashMap::new()),
        failure: Mutex::new(None),
        cancel: CancellationToken::new(),
        cancel_cause: Mutex::new(None),
        callbacks: Mutex::new(HashMap::new()),
        finished: AtomicBool::new(false),
      }),
    }
  }

  /// Read a state value. Stream values come back as handle clones.
  pub fn value(&self, key: &str) -> Option<TaskValue> {
    self.lock_state().get(key).cloned()
  }

  /// Read a string value, failing on missing or mis-kinded entries.
  pub fn get_string(&self, key: &str) -> Result<String, TaskError> {
    match self.require(key)? {
      TaskValue::String(s) => Ok(s),
      other => Err(wrong_kind(key, "a string", &other)),
    }
  }

  /// Read an integer value, failing on missing or mis-kinded entries.
  pub fn get_int(&self, key: &str) -> Result<i64, TaskError> {
    match self.require(key)? {
      TaskValue::Int(i) => Ok(i),
      other => Err(wrong_kind(key, "an integer", &other)),
    }
  }

  /// Read a byte-stream handle, failing on missing or mis-kinded entries.
  pub fn get_stream(&self, key: &str) -> Result<StreamHandle, TaskError> {
    match self.require(key)? {
      TaskValue::Stream(handle) => Ok(handle),
      other => Err(wrong_kind(key, "a byte stream", &other)),
    }
  }

  /// Write a state value.
  pub fn set_value(&self, key: &str, value: TaskValue) -> Result<(), TaskError> {
    if key.trim().is_empty() {
      return Err(TaskError::BlankKey);
    }
    if self.inner.finished.load(Ordering::Acquire) {
      return Err(TaskError::Finished);
    }
    self.lock_state().insert(key.to_string(), value);
    Ok(())
  }

  /// Record an error with its classification. The last write wins.
  pub fn set_error(&self, message: impl Into<String>, code: TaskResultCode) {
    *self.inner.failure.lock().expect("task failure lock poisoned") = Some(TaskFailure {
      message: message.into(),
      code,
    });
  }

  /// The recorded error, if any.
  pub fn error(&self) -> Option<TaskFailure> {
    self
      .inner
      .failure
      .lock()
      .expect("task failure lock poisoned")
      .clone()
  }

  /// The recorded error classification, if any.
  pub fn result_code(&self) -> Option<TaskResultCode> {
    self.error().map(|f| f.code)
  }

  /// Cancel the task. The first cause wins; later calls are no-ops.
  pub fn cancel(&self, cause: &str) {
    {
      let mut slot = self
        .inner
        .cancel_cause
        .lock()
        .expect("task cancel cause lock poisoned");
      if slot.is_none() {
        *slot = Some(cause.to_string());
      }
    }
    self.inner.cancel.cancel();
  }

  /// A clone of the cancellation signal, for use in `select!`.
  pub fn cancel_signal(&self) -> CancellationToken {
    self.inner.cancel.clone()
  }

  pub fn is_cancelled(&self) -> bool {
    self.inner.cancel.is_cancelled()
  }

  /// The cancellation cause, once the task has been cancelled.
  pub fn cancel_cause(&self) -> Option<String> {
    self
      .inner
      .cancel_cause
      .lock()
      .expect("task cancel cause lock poisoned")
      .clone()
  }

  /// Register a named finish callback. Re-adding a name replaces it.
  ///
  /// Callbacks added after the task finished never run.
  pub fn add_finished_callback<F>(&self, name: &str, callback: F)
  where
    F: Fn(&Task, TaskStatus) + Send + Sync + 'static,
  {
    self
      .lock_callbacks()
      .insert(name.to_string(), Box::new(callback));
  }

  /// Remove a named finish callback. Unknown names are ignored.
  pub fn remove_finished_callback(&self, name: &str) {
    self.lock_callbacks().remove(name);
  }

  /// Finish the task: seal its state and run every registered callback
  /// exactly once. Later calls are no-ops.
  pub fn finish(&self, status: TaskStatus) {
    if self.inner.finished.swap(true, Ordering::AcqRel) {
      return;
    }
    let callbacks: Vec<(String, FinishedCallback)> = self.lock_callbacks().drain().collect();
    for (_, callback) in callbacks {
      callback(self, status);
    }
  }

  pub fn is_finished(&self) -> bool {
    self.inner.finished.load(Ordering::Acquire)
  }

  fn require(&self, key: &str) -> Result<TaskValue, TaskError> {
    self.value(key).ok_or_else(|| TaskError::MissingValue {
      key: key.to_string(),
    })
  }

  fn lock_state(&self) -> std::sync::MutexGuard<'_, HashMap<String, TaskValue>> {
    self.inner.state.lock().expect("task state lock poisoned")
  }

  fn lock_callbacks(&self) -> std::sync::MutexGuard<'_, HashMap<String, FinishedCallback>> {
    self
      .inner
      .callbacks
      .lock()
      .expect("task callback lock poisoned")
  }
}

fn wrong_kind(key: &str, expected: &'static str, actual: &TaskValue) -> TaskError {
  TaskError::WrongKind {
    key: key.to_string(),
    expected,
    actual: actual.kind(),
  }
}
