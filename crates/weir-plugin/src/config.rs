//! Shared plugin configuration base.

use serde::Deserialize;

use crate::error::PluginError;

/// Configuration fields common to every plugin kind.
///
/// Plugin configs embed this with `#[serde(flatten)]` and call
/// [`prepare`](CommonConfig::prepare) at the start of their own
/// validation.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonConfig {
  plugin_name: String,
}

impl CommonConfig {
  pub fn new(plugin_name: impl Into<String>) -> Self {
    Self {
      plugin_name: plugin_name.into(),
    }
  }

  /// Normalize and validate the shared fields.
  pub fn prepare(&mut self) -> Result<(), PluginError> {
    self.plugin_name = self.plugin_name.trim().to_string();
    if self.plugin_name.is_empty() {
      return Err(PluginError::BlankName);
    }
    Ok(())
  }

  pub fn plugin_name(&self) -> &str {
    &self.plugin_name
  }
}
