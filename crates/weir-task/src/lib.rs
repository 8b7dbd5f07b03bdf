//! Weir Task
//!
//! This crate provides the unit of work that flows through a weir
//! pipeline. A [`Task`] carries:
//! - a typed key/value state map written and read by pipeline stages,
//! - a cancellation signal with a human-readable cause,
//! - an error slot holding one message plus a result classification,
//! - a registry of named callbacks that run once when the task finishes.
//!
//! Plugins communicate only through this contract; they never assume how
//! the state is represented internally. Byte streams stored in task state
//! are wrapped in a [`StreamHandle`], a single-shot handle that guarantees
//! the underlying stream is released exactly once no matter how many
//! stages hold a clone.

mod error;
mod task;
mod value;

pub use error::TaskError;
pub use task::{Task, TaskFailure, TaskResultCode, TaskStatus};
pub use value::{BoxedReader, StreamHandle, TaskValue};
