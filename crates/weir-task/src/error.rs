//! Task errors.

/// Errors raised by the task state contract.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
  /// No value is stored under the requested key.
  #[error("no task value under key '{key}'")]
  MissingValue { key: String },

  /// A value exists under the key but has a different kind than asked for.
  #[error("task value under key '{key}' is {actual}, expected {expected}")]
  WrongKind {
    key: String,
    expected: &'static str,
    actual: &'static str,
  },

  /// State keys must be non-blank.
  #[error("task state key must not be blank")]
  BlankKey,

  /// The task already ran its finish callbacks; its state is sealed.
  #[error("task already finished")]
  Finished,
}
