//! TLS-aware client construction.

use reqwest::Client;

use crate::config::ValidatedConfig;
use crate::error::ConfigError;

/// Build the long-lived client for one plugin instance.
///
/// The client carries the validated TLS policy and the per-call timeout
/// (absent when the configured timeout is zero) and holds no per-call
/// state, so it is shared by every concurrent dispatch.
pub fn build_client(config: &ValidatedConfig) -> Result<Client, ConfigError> {
  let mut builder = Client::builder();

  if config.insecure_tls {
    builder = builder.danger_accept_invalid_certs(true);
  }

  if let Some(identity) = &config.identity {
    builder = builder.identity(identity.clone());
  }

  if !config.ca_certs.is_empty() {
    // the configured bundle replaces system trust rather than extending it
    builder = builder.tls_built_in_root_certs(false);
    for cert in &config.ca_certs {
      builder = builder.add_root_certificate(cert.clone());
    }
  }

  if let Some(timeout) = config.timeout {
    builder = builder.timeout(timeout);
  }

  builder.build().map_err(|e| ConfigError::ClientBuild {
    message: e.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use weir_plugin::CommonConfig;

  use super::*;
  use crate::config::HttpOutputConfig;

  #[test]
  fn builds_from_a_plain_validated_config() {
    let config = HttpOutputConfig {
      common: CommonConfig::new("out"),
      url_pattern: "https://upstream.local/".to_string(),
      method: "GET".to_string(),
      insecure_tls: true,
      ..HttpOutputConfig::default()
    };
    let validated = config.validate().unwrap();
    assert!(build_client(&validated).is_ok());
  }

  #[test]
  fn builds_without_a_timeout_when_disabled() {
    let config = HttpOutputConfig {
      common: CommonConfig::new("out"),
      url_pattern: "http://upstream.local/".to_string(),
      method: "GET".to_string(),
      timeout_sec: 0,
      ..HttpOutputConfig::default()
    };
    let validated = config.validate().unwrap();
    assert!(build_client(&validated).is_ok());
  }
}
