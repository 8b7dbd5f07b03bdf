//! Plugin configuration and one-time validation.
//!
//! The raw [`HttpOutputConfig`] is what deserializes from pipeline
//! configuration. [`HttpOutputConfig::validate`] runs exactly once per
//! plugin instance and produces an immutable [`ValidatedConfig`]: trimmed
//! patterns, a parsed method, the compiled expected-code matcher, and the
//! loaded TLS material. A configuration that fails validation never
//! reaches client construction.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;
use reqwest::{Certificate, Identity, Method};
use serde::Deserialize;
use tracing::warn;
use url::Url;

use weir_pattern::scan_tokens;
use weir_plugin::CommonConfig;

use crate::error::ConfigError;

/// HTTP methods the plugin will dispatch.
pub const SUPPORTED_METHODS: &[&str] = &[
  "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS",
];

/// Byte cap applied when rendering a task IO value to text, e.g. the
/// response status code matched against the expected-code pattern.
pub const IO_DATA_FORMAT_LENGTH_LIMIT: usize = 128;

fn default_expected_response_code() -> String {
  ".*".to_string()
}

fn default_timeout_sec() -> u16 {
  120
}

fn default_close_body() -> bool {
  true
}

/// Raw configuration for one http-output plugin instance.
///
/// When `request_body_io_key` is set, the request body is the byte stream
/// stored under that task key and `request_body_buffer_pattern` is
/// ignored. When `close_body_after_pipeline` is false and
/// `response_body_io_key` is set, the downstream consumer of that key
/// owns the response body and is responsible for closing it.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpOutputConfig {
  #[serde(flatten)]
  pub common: CommonConfig,

  #[serde(default)]
  pub url_pattern: String,
  #[serde(default)]
  pub header_patterns: HashMap<String, String>,
  #[serde(default)]
  pub method: String,
  #[serde(default = "default_expected_response_code")]
  pub expected_response_code: String,
  /// 0-65535; zero disables the per-call deadline.
  #[serde(default = "default_timeout_sec")]
  pub timeout_sec: u16,

  #[serde(default)]
  pub request_body_io_key: String,
  #[serde(default)]
  pub request_body_buffer_pattern: String,
  #[serde(default)]
  pub response_code_key: String,
  #[serde(default)]
  pub response_body_io_key: String,
  #[serde(default = "default_close_body")]
  pub close_body_after_pipeline: bool,

  #[serde(default)]
  pub cert_file: String,
  #[serde(default)]
  pub key_file: String,
  #[serde(default)]
  pub ca_file: String,
  #[serde(default)]
  pub insecure_tls: bool,
}

impl Default for HttpOutputConfig {
  fn default() -> Self {
    Self {
      common: CommonConfig::new(""),
      url_pattern: String::new(),
      header_patterns: HashMap::new(),
      method: String::new(),
      expected_response_code: default_expected_response_code(),
      timeout_sec: default_timeout_sec(),
      request_body_io_key: String::new(),
      request_body_buffer_pattern: String::new(),
      response_code_key: String::new(),
      response_body_io_key: String::new(),
      close_body_after_pipeline: default_close_body(),
      cert_file: String::new(),
      key_file: String::new(),
      ca_file: String::new(),
      insecure_tls: false,
    }
  }
}

/// The immutable, validated form of [`HttpOutputConfig`].
#[derive(Clone)]
pub struct ValidatedConfig {
  pub(crate) common: CommonConfig,
  pub(crate) url_pattern: String,
  pub(crate) header_patterns: HashMap<String, String>,
  pub(crate) method: Method,
  pub(crate) expected_response_code: Regex,
  pub(crate) timeout: Option<Duration>,
  pub(crate) request_body_io_key: String,
  pub(crate) request_body_buffer_pattern: String,
  pub(crate) response_code_key: String,
  pub(crate) response_body_io_key: String,
  pub(crate) close_body_after_pipeline: bool,
  pub(crate) insecure_tls: bool,
  pub(crate) identity: Option<Identity>,
  pub(crate) ca_certs: Vec<Certificate>,
}

impl ValidatedConfig {
  pub fn plugin_name(&self) -> &str {
    self.common.plugin_name()
  }
}

impl HttpOutputConfig {
  /// Validate the raw configuration. Deterministic and side-effect free
  /// apart from a warning when the timeout is zero; safe to call again on
  /// the same input.
  pub fn validate(&self) -> Result<ValidatedConfig, ConfigError> {
    let mut common = self.common.clone();
    common.prepare()?;

    let url_pattern = self.url_pattern.trim().to_string();
    let url = Url::parse(&url_pattern).map_err(|e| ConfigError::InvalidUrl {
      message: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(ConfigError::InvalidUrl {
        message: format!("unsupported scheme '{}'", url.scheme()),
      });
    }
    if url.host_str().unwrap_or("").is_empty() {
      return Err(ConfigError::InvalidUrl {
        message: "missing host".to_string(),
      });
    }
    scan_tokens(&url_pattern).map_err(|source| ConfigError::InvalidUrlPattern { source })?;

    for (name, value) in &self.header_patterns {
      if name.trim().is_empty() {
        return Err(ConfigError::BlankHeaderName);
      }
      scan_tokens(name).map_err(|source| ConfigError::InvalidHeaderNamePattern {
        pattern: name.clone(),
        source,
      })?;
      scan_tokens(value).map_err(|source| ConfigError::InvalidHeaderValuePattern {
        pattern: value.clone(),
        source,
      })?;
    }

    let method = parse_method(self.method.trim())?;

    let expected_response_code = Regex::new(self.expected_response_code.trim())
      .map_err(|source| ConfigError::InvalidExpectedResponseCode { source })?;

    if self.timeout_sec == 0 {
      warn!(
        plugin = %common.plugin_name(),
        "zero timeout configured, requests can only be cancelled by their task"
      );
    }
    let timeout = match self.timeout_sec {
      0 => None,
      secs => Some(Duration::from_secs(u64::from(secs))),
    };

    scan_tokens(&self.request_body_buffer_pattern)
      .map_err(|source| ConfigError::InvalidBodyBufferPattern { source })?;

    let cert_file = self.cert_file.trim();
    let key_file = self.key_file.trim();
    let identity = match (cert_file.is_empty(), key_file.is_empty()) {
      (true, true) => None,
      (false, false) => {
        let mut pem = read_file(cert_file)?;
        pem.extend_from_slice(&read_file(key_file)?);
        let identity = Identity::from_pem(&pem).map_err(|e| ConfigError::InvalidKeyPair {
          message: e.to_string(),
        })?;
        Some(identity)
      }
      _ => return Err(ConfigError::AsymmetricKeyPair),
    };

    let ca_file = self.ca_file.trim();
    let ca_certs = if ca_file.is_empty() {
      Vec::new()
    } else {
      let pem = read_file(ca_file)?;
      let certs =
        Certificate::from_pem_bundle(&pem).map_err(|e| ConfigError::InvalidCaCertificate {
          message: e.to_string(),
        })?;
      if certs.is_empty() {
        return Err(ConfigError::InvalidCaCertificate {
          message: "no certificates found".to_string(),
        });
      }
      certs
    };

    Ok(ValidatedConfig {
      common,
      url_pattern,
      header_patterns: self.header_patterns.clone(),
      method,
      expected_response_code,
      timeout,
      request_body_io_key: self.request_body_io_key.trim().to_string(),
      request_body_buffer_pattern: self.request_body_buffer_pattern.clone(),
      response_code_key: self.response_code_key.trim().to_string(),
      response_body_io_key: self.response_body_io_key.trim().to_string(),
      close_body_after_pipeline: self.close_body_after_pipeline,
      insecure_tls: self.insecure_tls,
      identity,
      ca_certs,
    })
  }
}

fn parse_method(method: &str) -> Result<Method, ConfigError> {
  let upper = method.to_uppercase();
  if !SUPPORTED_METHODS.contains(&upper.as_str()) {
    return Err(ConfigError::InvalidMethod {
      method: method.to_string(),
    });
  }
  Method::from_bytes(upper.as_bytes()).map_err(|_| ConfigError::InvalidMethod {
    method: method.to_string(),
  })
}

fn read_file(path: &str) -> Result<Vec<u8>, ConfigError> {
  std::fs::read(path).map_err(|source| ConfigError::ReadFile {
    path: path.to_string(),
    source,
  })
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use weir_plugin::CommonConfig;

  use super::*;
  use crate::error::ConfigError;

  fn base_config() -> HttpOutputConfig {
    HttpOutputConfig {
      common: CommonConfig::new("out"),
      url_pattern: "http://upstream.local/orders/[order_id]".to_string(),
      method: "POST".to_string(),
      ..HttpOutputConfig::default()
    }
  }

  #[test]
  fn defaults_match_the_shipped_constructor() {
    let config: HttpOutputConfig =
      serde_json::from_str(r#"{"plugin_name": "out"}"#).unwrap();
    assert_eq!(config.timeout_sec, 120);
    assert!(config.close_body_after_pipeline);
    assert_eq!(config.expected_response_code, ".*");
  }

  #[test]
  fn valid_config_passes() {
    let validated = base_config().validate().unwrap();
    assert_eq!(validated.plugin_name(), "out");
    assert_eq!(validated.method, Method::POST);
    assert_eq!(validated.timeout, Some(Duration::from_secs(120)));
  }

  #[test]
  fn validate_is_idempotent_and_deterministic() {
    let config = base_config();
    let first = config.validate().unwrap();
    let second = config.validate().unwrap();
    assert_eq!(first.url_pattern, second.url_pattern);
    assert_eq!(first.method, second.method);
    assert_eq!(first.timeout, second.timeout);
    assert_eq!(
      first.expected_response_code.as_str(),
      second.expected_response_code.as_str()
    );
  }

  #[test]
  fn url_must_be_absolute_http_or_https_with_host() {
    for bad in ["", "not a url", "/relative/path", "ftp://host/x", "http://"] {
      let config = HttpOutputConfig {
        url_pattern: bad.to_string(),
        ..base_config()
      };
      assert!(
        matches!(config.validate(), Err(ConfigError::InvalidUrl { .. })),
        "accepted invalid url {bad:?}"
      );
    }
  }

  #[test]
  fn url_pattern_tokens_are_checked() {
    let config = HttpOutputConfig {
      url_pattern: "http://upstream.local/orders/[".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidUrlPattern { .. })
    ));
  }

  #[test]
  fn unsupported_method_fails_regardless_of_other_fields() {
    let config = HttpOutputConfig {
      method: "FETCH".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidMethod { .. })
    ));

    // TRACE is deliberately outside the allow-list
    let config = HttpOutputConfig {
      method: "TRACE".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidMethod { .. })
    ));
  }

  #[test]
  fn method_is_case_insensitive() {
    let config = HttpOutputConfig {
      method: "get".to_string(),
      ..base_config()
    };
    assert_eq!(config.validate().unwrap().method, Method::GET);
  }

  #[test]
  fn header_names_must_not_be_blank() {
    let mut config = base_config();
    config
      .header_patterns
      .insert("   ".to_string(), "v".to_string());
    assert!(matches!(
      config.validate(),
      Err(ConfigError::BlankHeaderName)
    ));
  }

  #[test]
  fn header_patterns_are_checked() {
    let mut config = base_config();
    config
      .header_patterns
      .insert("X-User".to_string(), "[".to_string());
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidHeaderValuePattern { .. })
    ));

    let mut config = base_config();
    config
      .header_patterns
      .insert("X-[".to_string(), "v".to_string());
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidHeaderNamePattern { .. })
    ));
  }

  #[test]
  fn expected_response_code_must_compile() {
    let config = HttpOutputConfig {
      expected_response_code: "2(".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidExpectedResponseCode { .. })
    ));
  }

  #[test]
  fn body_buffer_pattern_is_checked() {
    let config = HttpOutputConfig {
      request_body_buffer_pattern: "payload=[".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidBodyBufferPattern { .. })
    ));
  }

  #[test]
  fn zero_timeout_passes_validation() {
    let config = HttpOutputConfig {
      timeout_sec: 0,
      ..base_config()
    };
    let validated = config.validate().unwrap();
    assert_eq!(validated.timeout, None);
  }

  #[test]
  fn asymmetric_key_pair_is_rejected() {
    let config = HttpOutputConfig {
      cert_file: "/tmp/client.crt".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::AsymmetricKeyPair)
    ));

    let config = HttpOutputConfig {
      key_file: "/tmp/client.key".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::AsymmetricKeyPair)
    ));
  }

  #[test]
  fn unreadable_key_pair_files_are_rejected() {
    let config = HttpOutputConfig {
      cert_file: "/nonexistent/client.crt".to_string(),
      key_file: "/nonexistent/client.key".to_string(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::ReadFile { .. })
    ));
  }

  #[test]
  fn malformed_pem_material_is_rejected() {
    let mut cert = tempfile::NamedTempFile::new().unwrap();
    cert.write_all(b"not a certificate").unwrap();
    let mut key = tempfile::NamedTempFile::new().unwrap();
    key.write_all(b"not a key").unwrap();

    let config = HttpOutputConfig {
      cert_file: cert.path().to_string_lossy().into_owned(),
      key_file: key.path().to_string_lossy().into_owned(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidKeyPair { .. })
    ));

    let mut ca = tempfile::NamedTempFile::new().unwrap();
    ca.write_all(b"not a bundle").unwrap();
    let config = HttpOutputConfig {
      ca_file: ca.path().to_string_lossy().into_owned(),
      ..base_config()
    };
    assert!(matches!(
      config.validate(),
      Err(ConfigError::InvalidCaCertificate { .. })
    ));
  }

  #[test]
  fn blank_plugin_name_is_rejected() {
    let config = HttpOutputConfig {
      common: CommonConfig::new("  "),
      ..base_config()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Plugin(_))));
  }
}
