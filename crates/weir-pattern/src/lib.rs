//! Token pattern scanning and expansion.
//!
//! A pattern is a literal string containing placeholders that reference
//! task state fields by key:
//!
//! ```text
//! http://upstream.local/orders/[order_id]?u=[user]
//! ```
//!
//! `[order_id]` expands to the value stored under `order_id` at dispatch
//! time. A backslash escapes the next character, so `\[` produces a
//! literal bracket.
//!
//! Patterns are used in two phases:
//! 1. [`scan_tokens`] at configuration time: validates syntax while field
//!    values are still unknown and returns the referenced field names.
//! 2. [`expand`] at dispatch time: renders the pattern against a task's
//!    state; string and integer values render, byte streams do not.

use weir_task::{Task, TaskValue};

mod error;

pub use error::PatternError;

enum Chunk {
  Literal(String),
  Token(String),
}

/// Validate a pattern and list the field names it references.
///
/// Accepts the empty pattern (no tokens).
pub fn scan_tokens(pattern: &str) -> Result<Vec<String>, PatternError> {
  Ok(
    parse(pattern)?
      .into_iter()
      .filter_map(|chunk| match chunk {
        Chunk::Token(name) => Some(name),
        Chunk::Literal(_) => None,
      })
      .collect(),
  )
}

/// Render a pattern against a task's state.
pub fn expand(pattern: &str, task: &Task) -> Result<String, PatternError> {
  let mut out = String::with_capacity(pattern.len());
  for chunk in parse(pattern)? {
    match chunk {
      Chunk::Literal(text) => out.push_str(&text),
      Chunk::Token(field) => match task.value(&field) {
        Some(TaskValue::String(s)) => out.push_str(&s),
        Some(TaskValue::Int(i)) => out.push_str(&i.to_string()),
        Some(TaskValue::Stream(_)) => return Err(PatternError::Unrenderable { field }),
        None => return Err(PatternError::MissingField { field }),
      },
    }
  }
  Ok(out)
}

fn parse(pattern: &str) -> Result<Vec<Chunk>, PatternError> {
  let mut chunks = Vec::new();
  let mut literal = String::new();
  let mut chars = pattern.char_indices();

  while let Some((position, ch)) = chars.next() {
    match ch {
      '\\' => match chars.next() {
        Some((_, escaped)) => literal.push(escaped),
        None => return Err(PatternError::DanglingEscape),
      },
      '[' => {
        if !literal.is_empty() {
          chunks.push(Chunk::Literal(std::mem::take(&mut literal)));
        }
        let mut name = String::new();
        loop {
          match chars.next() {
            Some((_, ']')) => break,
            Some((nested, '[')) => {
              return Err(PatternError::NestedToken { position: nested });
            }
            Some((_, c)) => name.push(c),
            None => return Err(PatternError::UnterminatedToken { position }),
          }
        }
        if name.is_empty() {
          return Err(PatternError::EmptyToken { position });
        }
        chunks.push(Chunk::Token(name));
      }
      other => literal.push(other),
    }
  }

  if !literal.is_empty() {
    chunks.push(Chunk::Literal(literal));
  }
  Ok(chunks)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scan_lists_referenced_fields() {
    let tokens = scan_tokens("http://host/[a]/x/[b]").unwrap();
    assert_eq!(tokens, vec!["a".to_string(), "b".to_string()]);
  }

  #[test]
  fn scan_accepts_plain_and_empty_patterns() {
    assert!(scan_tokens("").unwrap().is_empty());
    assert!(scan_tokens("no tokens here").unwrap().is_empty());
  }

  #[test]
  fn scan_rejects_malformed_patterns() {
    assert!(matches!(
      scan_tokens("oops ["),
      Err(PatternError::UnterminatedToken { .. })
    ));
    assert!(matches!(
      scan_tokens("[]"),
      Err(PatternError::EmptyToken { .. })
    ));
    assert!(matches!(
      scan_tokens("[a[b]]"),
      Err(PatternError::NestedToken { .. })
    ));
    assert!(matches!(
      scan_tokens("trailing \\"),
      Err(PatternError::DanglingEscape)
    ));
  }

  #[test]
  fn escape_produces_literal_brackets() {
    assert_eq!(scan_tokens("\\[not-a-token]").unwrap().len(), 0);
    let task = Task::new();
    assert_eq!(expand("\\[x]", &task).unwrap(), "[x]");
  }

  #[test]
  fn expand_renders_strings_and_integers() {
    let task = Task::new();
    task.set_value("user", TaskValue::from("ada")).unwrap();
    task.set_value("retries", TaskValue::Int(2)).unwrap();
    assert_eq!(
      expand("u=[user]&r=[retries]", &task).unwrap(),
      "u=ada&r=2"
    );
  }

  #[test]
  fn expand_fails_on_missing_or_stream_fields() {
    let task = Task::new();
    assert!(matches!(
      expand("[absent]", &task),
      Err(PatternError::MissingField { .. })
    ));

    let handle = weir_task::StreamHandle::new(Box::new(std::io::Cursor::new(b"x".to_vec())));
    task
      .set_value("body", TaskValue::Stream(handle))
      .unwrap();
    assert!(matches!(
      expand("[body]", &task),
      Err(PatternError::Unrenderable { .. })
    ));
  }
}
