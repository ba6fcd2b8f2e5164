//! Step execution.
//!
//! A [`StepExecutor`] runs one step of a unit inside the node's working
//! directory. [`ShellExecutor`] hands the step's `run` script to a shell;
//! tests substitute their own executors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_config::StepDef;

use crate::error::ExecutorError;
use crate::secrets::SecretValue;

/// Everything a step can see about the node it runs for.
#[derive(Debug, Clone)]
pub struct StepContext {
  pub execution_id: String,
  pub node_id: String,
  pub unit: String,
  pub work_dir: PathBuf,
  /// `INPUT_*`, `MATRIX_*` and `WEFT_*` variables.
  pub env: BTreeMap<String, String>,
  /// `SECRET_*` variables, kept apart so they never reach logs.
  pub secrets: BTreeMap<String, SecretValue>,
}

impl StepContext {
  /// Replace every secret value in `text` with `***`.
  pub fn mask(&self, text: &str) -> String {
    self
      .secrets
      .values()
      .filter(|s| !s.expose().is_empty())
      .fold(text.to_string(), |acc, s| acc.replace(s.expose(), "***"))
  }
}

/// How a step ended.
#[derive(Debug, Clone)]
pub struct StepOutcome {
  /// Process exit code; `None` when terminated by a signal.
  pub exit_code: Option<i32>,
  /// Last line of output, secrets masked.
  pub summary: Option<String>,
}

impl StepOutcome {
  pub fn success() -> Self {
    Self {
      exit_code: Some(0),
      summary: None,
    }
  }

  pub fn failure(exit_code: i32, summary: impl Into<String>) -> Self {
    Self {
      exit_code: Some(exit_code),
      summary: Some(summary.into()),
    }
  }

  pub fn succeeded(&self) -> bool {
    self.exit_code == Some(0)
  }
}

/// Runs a single step.
#[async_trait]
pub trait StepExecutor: Send + Sync {
  /// Run `step`. Must return promptly with [`ExecutorError::Cancelled`] once
  /// `cancel` fires.
  async fn execute(
    &self,
    step: &StepDef,
    ctx: &StepContext,
    cancel: CancellationToken,
  ) -> Result<StepOutcome, ExecutorError>;
}

/// Runs steps with `sh -c <run>`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
  shell: String,
}

impl ShellExecutor {
  pub fn new() -> Self {
    Self {
      shell: "sh".to_string(),
    }
  }

  /// Use a different shell binary. It must accept `-c <script>`.
  pub fn with_shell(shell: impl Into<String>) -> Self {
    Self {
      shell: shell.into(),
    }
  }
}

impl Default for ShellExecutor {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl StepExecutor for ShellExecutor {
  async fn execute(
    &self,
    step: &StepDef,
    ctx: &StepContext,
    cancel: CancellationToken,
  ) -> Result<StepOutcome, ExecutorError> {
    let mut command = Command::new(&self.shell);
    command
      .arg("-c")
      .arg(&step.run)
      .current_dir(&ctx.work_dir)
      .envs(&ctx.env)
      .envs(ctx.secrets.iter().map(|(k, v)| (k, v.expose())))
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let child = command.spawn()?;

    // Dropping the wait future drops the child, which kills it.
    let output = tokio::select! {
      output = child.wait_with_output() => output?,
      _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
    };

    let stdout = ctx.mask(&String::from_utf8_lossy(&output.stdout));
    let stderr = ctx.mask(&String::from_utf8_lossy(&output.stderr));
    for line in stdout.lines() {
      debug!(node_id = %ctx.node_id, step = %step.name, stream = "stdout", "{}", line);
    }
    for line in stderr.lines() {
      debug!(node_id = %ctx.node_id, step = %step.name, stream = "stderr", "{}", line);
    }

    let summary = stderr
      .lines()
      .chain(stdout.lines())
      .filter(|l| !l.trim().is_empty())
      .last()
      .map(str::to_string);

    Ok(StepOutcome {
      exit_code: output.status.code(),
      summary,
    })
  }
}
