//! Weir HTTP Output
//!
//! The outbound-HTTP stage of a weir pipeline. For each task the plugin
//! renders a request from configured token patterns (URL, headers, body),
//! executes it through a shared TLS-aware client under a per-call
//! timeout, and writes the response back into task state for downstream
//! stages.
//!
//! The dispatch path composes three independent lifecycles:
//! - the task's cancellation signal, which aborts the in-flight call,
//! - the HTTP round trip, performed by a single spawned worker,
//! - response-body release, deferred to a task finish callback when
//!   `close_body_after_pipeline` is set.
//!
//! Configuration is validated exactly once, before the client is built;
//! an invalid configuration never dispatches a request.

mod client;
mod config;
mod error;
mod output;

pub use client::build_client;
pub use config::{
  HttpOutputConfig, ValidatedConfig, IO_DATA_FORMAT_LENGTH_LIMIT, SUPPORTED_METHODS,
};
pub use error::ConfigError;
pub use output::{HttpOutput, HTTP_CONTENT_LENGTH_KEY};
