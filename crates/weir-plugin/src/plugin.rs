//! The plugin contract.

use async_trait::async_trait;

use weir_task::Task;

/// A pipeline plugin.
///
/// `run` never raises: failures are recorded on the task with a result
/// classification and the task is returned normally, so the pipeline can
/// branch on the classification.
#[async_trait]
pub trait Plugin: Send + Sync {
  /// The configured plugin instance name.
  fn name(&self) -> &str;

  /// Per-pipeline preparation hook, called once when the plugin is bound
  /// to a pipeline.
  fn prepare(&self, _pipeline: &str) {}

  /// Run one task through the plugin.
  async fn run(&self, task: Task) -> Task;

  /// Shutdown hook, called when the plugin instance is retired.
  fn close(&self) {}
}
