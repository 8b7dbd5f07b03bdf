//! Request dispatch and response mapping.

use std::io;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, USER_AGENT};
use reqwest::{Client, Request, Response};
use tokio::io::AsyncReadExt;
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use weir_pattern::expand;
use weir_plugin::Plugin;
use weir_task::{BoxedReader, StreamHandle, Task, TaskResultCode, TaskValue};

use crate::client::build_client;
use crate::config::{HttpOutputConfig, IO_DATA_FORMAT_LENGTH_LIMIT, ValidatedConfig};
use crate::error::ConfigError;

/// Task state key under which an upstream stage may leave a
/// content-length hint for streamed request bodies. When present and
/// non-negative, the stream read is bounded to that many bytes and the
/// length is sent explicitly; otherwise the stream is sent unbounded.
pub const HTTP_CONTENT_LENGTH_KEY: &str = "HTTP_CONTENT_LENGTH";

const USER_AGENT_VALUE: &str = "Weir";

enum OutboundBody {
  Stream {
    reader: BoxedReader,
    length: Option<u64>,
  },
  Buffer(String),
}

/// The outbound-HTTP plugin.
///
/// Holds the validated configuration and one shared client; both are
/// read-only after construction, so any number of tasks may dispatch
/// concurrently through the same instance.
pub struct HttpOutput {
  conf: ValidatedConfig,
  client: Client,
}

impl HttpOutput {
  /// Validate the configuration and build the client. An invalid
  /// configuration never produces a constructed plugin.
  pub fn new(config: &HttpOutputConfig) -> Result<Self, ConfigError> {
    let conf = config.validate()?;
    let client = build_client(&conf)?;
    Ok(Self { conf, client })
  }

  #[instrument(name = "http_output_dispatch", skip_all, fields(plugin = %self.conf.plugin_name()))]
  async fn dispatch(&self, task: &Task) -> Option<u16> {
    if task.is_cancelled() {
      let cause = task.cancel_cause().unwrap_or_else(|| "unknown".to_string());
      task.set_error(
        format!("task is cancelled by {cause}"),
        TaskResultCode::TaskCancelled,
      );
      return None;
    }

    // validated at setup; a failure here means the task is missing a
    // referenced field, which only the dispatch can discover
    let link = match expand(&self.conf.url_pattern, task) {
      Ok(link) => link,
      Err(e) => {
        task.set_error(
          format!("url pattern expansion failed: {e}"),
          TaskResultCode::InternalServerError,
        );
        return None;
      }
    };

    let body = self.resolve_body(task)?;

    let mut builder = self.client.request(self.conf.method.clone(), link.clone());
    for (name_pattern, value_pattern) in &self.conf.header_patterns {
      let name = match expand(name_pattern, task) {
        Ok(name) => name,
        Err(e) => {
          task.set_error(
            format!("header name pattern expansion failed: {e}"),
            TaskResultCode::InternalServerError,
          );
          return None;
        }
      };
      let value = match expand(value_pattern, task) {
        Ok(value) => value,
        Err(e) => {
          task.set_error(
            format!("header value pattern expansion failed: {e}"),
            TaskResultCode::InternalServerError,
          );
          return None;
        }
      };
      builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder.header(USER_AGENT, USER_AGENT_VALUE);

    builder = match body {
      OutboundBody::Buffer(text) => builder
        .header(CONTENT_LENGTH, text.len().to_string())
        .body(text),
      OutboundBody::Stream { reader, length } => {
        let builder = builder.body(reqwest::Body::wrap_stream(ReaderStream::new(reader)));
        match length {
          Some(length) => builder.header(CONTENT_LENGTH, length.to_string()),
          None => builder,
        }
      }
    };

    let request = match builder.build() {
      Ok(request) => request,
      Err(e) => {
        task.set_error(
          format!("request construction failed: {e}"),
          TaskResultCode::InternalServerError,
        );
        return None;
      }
    };

    debug!(method = %self.conf.method, url = %link, "dispatching outbound request");
    let response = self.send(task, request).await?;

    let status = response.status().as_u16();
    let rendered = render_io_data(status);
    if !self.conf.expected_response_code.is_match(&rendered) {
      task.set_error(
        format!(
          "response code: {status} doesn't match with expected: {}",
          self.conf.expected_response_code.as_str()
        ),
        TaskResultCode::InternalServerError,
      );
      return None;
    }

    if !self.conf.response_code_key.is_empty() {
      if let Err(e) = task.set_value(&self.conf.response_code_key, TaskValue::Int(i64::from(status)))
      {
        task.set_error(e.to_string(), TaskResultCode::InternalServerError);
        return None;
      }
    }

    if !self.conf.response_body_io_key.is_empty() || self.conf.close_body_after_pipeline {
      let reader = StreamReader::new(Box::pin(response.bytes_stream().map_err(io::Error::other)));
      let handle = StreamHandle::new(Box::new(reader));

      if !self.conf.response_body_io_key.is_empty() {
        if let Err(e) = task.set_value(
          &self.conf.response_body_io_key,
          TaskValue::Stream(handle.clone()),
        ) {
          task.set_error(e.to_string(), TaskResultCode::InternalServerError);
          return None;
        }
      }

      if self.conf.close_body_after_pipeline {
        let callback_name = format!("{}-close-response-body", self.conf.plugin_name());
        let registered = callback_name.clone();
        let body = handle.clone();
        task.add_finished_callback(&callback_name, move |finished, _status| {
          finished.remove_finished_callback(&registered);
          body.close();
        });
      }
    }

    Some(status)
  }

  fn resolve_body(&self, task: &Task) -> Option<OutboundBody> {
    if self.conf.request_body_io_key.is_empty() {
      return match expand(&self.conf.request_body_buffer_pattern, task) {
        Ok(body) => Some(OutboundBody::Buffer(body)),
        Err(e) => {
          task.set_error(
            format!("body buffer pattern expansion failed: {e}"),
            TaskResultCode::InternalServerError,
          );
          None
        }
      };
    }

    let key = &self.conf.request_body_io_key;
    let handle = match task.get_stream(key) {
      Ok(handle) => handle,
      Err(e) => {
        task.set_error(
          format!("input '{key}' is not usable as a request body: {e}"),
          TaskResultCode::MissingInput,
        );
        return None;
      }
    };
    let reader = match handle.take_reader() {
      Some(reader) => reader,
      None => {
        task.set_error(
          format!("input '{key}' was already consumed"),
          TaskResultCode::MissingInput,
        );
        return None;
      }
    };

    match content_length_hint(task) {
      Some(length) => Some(OutboundBody::Stream {
        reader: Box::new(reader.take(length)),
        length: Some(length),
      }),
      None => Some(OutboundBody::Stream {
        reader,
        length: None,
      }),
    }
  }

  /// Dispatch one request, racing its completion against the task's
  /// cancellation signal.
  ///
  /// One worker performs the round trip under a per-call cancellation
  /// token and reports its single outcome through the join handle. If
  /// the task is cancelled first, cancelling the token aborts the
  /// in-flight call; the worker then resolves on its own and the late
  /// outcome is dropped with the handle, touching no shared state.
  async fn send(&self, task: &Task, request: Request) -> Option<Response> {
    let call_cancel = CancellationToken::new();
    let call_token = call_cancel.clone();
    let client = self.client.clone();

    let mut worker = tokio::spawn(async move {
      tokio::select! {
        outcome = client.execute(request) => Some(outcome),
        _ = call_token.cancelled() => None,
      }
    });

    tokio::select! {
      joined = &mut worker => match joined {
        Ok(Some(Ok(response))) => Some(response),
        Ok(Some(Err(e))) => {
          task.set_error(e.to_string(), TaskResultCode::ServiceUnavailable);
          None
        }
        // the call token is only cancelled by the branch below, after
        // which the worker is no longer awaited
        Ok(None) => {
          task.set_error(
            "request worker stopped without an outcome",
            TaskResultCode::InternalServerError,
          );
          None
        }
        Err(e) => {
          task.set_error(
            format!("request worker failed: {e}"),
            TaskResultCode::InternalServerError,
          );
          None
        }
      },
      _ = task.cancel_signal().cancelled_owned() => {
        call_cancel.cancel();
        let cause = task.cancel_cause().unwrap_or_else(|| "unknown".to_string());
        task.set_error(
          format!("task is cancelled by {cause}"),
          TaskResultCode::TaskCancelled,
        );
        None
      }
    }
  }
}

#[async_trait]
impl Plugin for HttpOutput {
  fn name(&self) -> &str {
    self.conf.plugin_name()
  }

  async fn run(&self, task: Task) -> Task {
    match self.dispatch(&task).await {
      Some(status) => {
        info!(
          plugin = %self.conf.plugin_name(),
          status,
          "outbound request completed"
        );
      }
      None => {
        if let Some(failure) = task.error() {
          error!(
            plugin = %self.conf.plugin_name(),
            code = ?failure.code,
            error = %failure.message,
            "outbound request failed"
          );
        }
      }
    }
    task
  }
}

fn content_length_hint(task: &Task) -> Option<u64> {
  match task.value(HTTP_CONTENT_LENGTH_KEY)? {
    TaskValue::String(s) => s.trim().parse().ok(),
    TaskValue::Int(i) => u64::try_from(i).ok(),
    TaskValue::Stream(_) => None,
  }
}

fn render_io_data(value: impl ToString) -> String {
  let mut rendered = value.to_string();
  rendered.truncate(IO_DATA_FORMAT_LENGTH_LIMIT);
  rendered
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_length_hint_reads_strings_and_integers() {
    let task = Task::new();
    assert_eq!(content_length_hint(&task), None);

    task
      .set_value(HTTP_CONTENT_LENGTH_KEY, TaskValue::from("42"))
      .unwrap();
    assert_eq!(content_length_hint(&task), Some(42));

    task
      .set_value(HTTP_CONTENT_LENGTH_KEY, TaskValue::Int(7))
      .unwrap();
    assert_eq!(content_length_hint(&task), Some(7));

    task
      .set_value(HTTP_CONTENT_LENGTH_KEY, TaskValue::from("-1"))
      .unwrap();
    assert_eq!(content_length_hint(&task), None);

    task
      .set_value(HTTP_CONTENT_LENGTH_KEY, TaskValue::Int(-1))
      .unwrap();
    assert_eq!(content_length_hint(&task), None);
  }

  #[test]
  fn render_io_data_caps_length() {
    assert_eq!(render_io_data(200), "200");
    let long = "9".repeat(IO_DATA_FORMAT_LENGTH_LIMIT + 50);
    assert_eq!(render_io_data(long).len(), IO_DATA_FORMAT_LENGTH_LIMIT);
  }
}
