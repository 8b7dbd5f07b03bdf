//! Pattern errors.

/// Errors raised while scanning or expanding a token pattern.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
  /// A `[` with no matching `]`.
  #[error("unterminated token starting at byte {position}")]
  UnterminatedToken { position: usize },

  /// A `[]` with no field name inside.
  #[error("empty token at byte {position}")]
  EmptyToken { position: usize },

  /// A `[` inside a token.
  #[error("nested token delimiter at byte {position}")]
  NestedToken { position: usize },

  /// A `\` at the end of the pattern with nothing to escape.
  #[error("dangling escape at end of pattern")]
  DanglingEscape,

  /// Expansion referenced a field the task does not carry.
  #[error("no task value under field '{field}'")]
  MissingField { field: String },

  /// Expansion referenced a field that cannot render into text.
  #[error("task value under field '{field}' cannot be rendered into text")]
  Unrenderable { field: String },
}
