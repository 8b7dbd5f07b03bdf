//! Weir Plugin
//!
//! The contract every pipeline plugin kind implements, plus the
//! configuration base shared by all plugin configs (the plugin's name and
//! its pipeline binding). Plugin-specific options live in each plugin's
//! own config struct, which embeds [`CommonConfig`].

mod config;
mod error;
mod plugin;

pub use config::CommonConfig;
pub use error::PluginError;
pub use plugin::Plugin;
