//! Configuration errors.
//!
//! All of these are fatal at setup time; none surface per-task.

use weir_pattern::PatternError;
use weir_plugin::PluginError;

/// A reason the plugin configuration was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error(transparent)]
  Plugin(#[from] PluginError),

  /// The URL pattern is not an absolute http/https URL with a host.
  #[error("invalid url: {message}")]
  InvalidUrl { message: String },

  #[error("invalid url pattern")]
  InvalidUrlPattern {
    #[source]
    source: PatternError,
  },

  /// Header names must be non-blank after trimming.
  #[error("invalid header name")]
  BlankHeaderName,

  #[error("invalid header name pattern '{pattern}'")]
  InvalidHeaderNamePattern {
    pattern: String,
    #[source]
    source: PatternError,
  },

  #[error("invalid header value pattern '{pattern}'")]
  InvalidHeaderValuePattern {
    pattern: String,
    #[source]
    source: PatternError,
  },

  #[error("invalid http method '{method}'")]
  InvalidMethod { method: String },

  #[error("invalid expected response code")]
  InvalidExpectedResponseCode {
    #[source]
    source: regex::Error,
  },

  #[error("invalid body buffer pattern")]
  InvalidBodyBufferPattern {
    #[source]
    source: PatternError,
  },

  /// cert_file and key_file must be configured together.
  #[error("certificate and private key files must be configured together")]
  AsymmetricKeyPair,

  #[error("invalid PEM encoded certificate and/or private key file(s): {message}")]
  InvalidKeyPair { message: String },

  #[error("invalid PEM encoded CA certificate file: {message}")]
  InvalidCaCertificate { message: String },

  #[error("failed to read '{path}'")]
  ReadFile {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to build http client: {message}")]
  ClientBuild { message: String },
}
