//! Plugin errors.

/// Errors raised by the shared plugin configuration base.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
  /// Every plugin instance needs a non-blank name.
  #[error("plugin name must not be blank")]
  BlankName,
}
