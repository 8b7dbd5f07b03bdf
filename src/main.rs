use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;

use weir_http_output::{HttpOutput, HttpOutputConfig};
use weir_plugin::Plugin;
use weir_task::{Task, TaskStatus, TaskValue};

/// Weir - run one task through a configured http-output plugin
#[derive(Parser)]
#[command(name = "weir")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the plugin configuration file (JSON)
  config: PathBuf,

  /// Seed task state entries, as key=value pairs
  #[arg(long = "set", value_name = "KEY=VALUE")]
  set: Vec<String>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run(cli).await })
}

async fn run(cli: Cli) -> Result<()> {
  let raw = tokio::fs::read_to_string(&cli.config)
    .await
    .with_context(|| format!("failed to read config file: {}", cli.config.display()))?;
  let config: HttpOutputConfig = serde_json::from_str(&raw)
    .with_context(|| format!("failed to parse config file: {}", cli.config.display()))?;

  let plugin = HttpOutput::new(&config).context("plugin configuration rejected")?;
  eprintln!("Loaded plugin: {}", plugin.name());

  let task = Task::new();
  for entry in &cli.set {
    let (key, value) = entry
      .split_once('=')
      .with_context(|| format!("invalid --set entry '{entry}', expected KEY=VALUE"))?;
    task.set_value(key, TaskValue::from(value))?;
  }

  // Ctrl-C cancels the in-flight task rather than killing the process
  let interruptible = task.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      interruptible.cancel("interrupt");
    }
  });

  let task = plugin.run(task).await;

  match task.error() {
    Some(failure) => {
      eprintln!("Dispatch failed ({:?}): {}", failure.code, failure.message);
    }
    None => {
      eprintln!("Dispatch completed");
      if !config.response_code_key.trim().is_empty() {
        let code = task.get_int(config.response_code_key.trim())?;
        println!("{}: {code}", config.response_code_key.trim());
      }
      if !config.response_body_io_key.trim().is_empty() {
        let handle = task.get_stream(config.response_body_io_key.trim())?;
        if let Some(mut reader) = handle.take_reader() {
          let mut body = Vec::new();
          reader
            .read_to_end(&mut body)
            .await
            .context("failed to read response body")?;
          println!("{}", String::from_utf8_lossy(&body));
        }
      }
    }
  }

  task.finish(TaskStatus::Finished);
  plugin.close();

  Ok(())
}
