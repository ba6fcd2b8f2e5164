//! Execution of a single node: downloads, steps, publishes.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{StreamExt, TryStreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weft_artifact::{ArtifactName, ByteStream, Store};
use weft_config::StepDef;
use weft_workflow::{JobNode, LockedDownload, LockedPublish};

use crate::error::ExecutorError;
use crate::events::{ExecutionEvent, ExecutionNotifier};
use crate::executor::{StepContext, StepExecutor};
use crate::result::{NodeResult, NodeStatus, StepRecord};
use crate::secrets::{SecretProvider, env_key};

/// Why the body of a node stopped early.
enum Halt {
  Failed(String),
  Cancelled,
}

/// Everything needed to run one node, owned so it can move into a task.
pub(crate) struct UnitExecution {
  pub execution_id: String,
  pub node: JobNode,
  pub steps: Vec<StepDef>,
  pub work_root: PathBuf,
  pub timeout: Duration,
  pub store: Arc<dyn Store>,
  pub executor: Arc<dyn StepExecutor>,
  pub secrets: Arc<dyn SecretProvider>,
  pub notifier: Arc<dyn ExecutionNotifier>,
}

impl UnitExecution {
  pub async fn run(self, cancel: CancellationToken) -> NodeResult {
    let started = Instant::now();
    let mut result = self.execute(&cancel).await;
    result.duration_ms = started.elapsed().as_millis() as u64;
    result
  }

  async fn execute(&self, cancel: &CancellationToken) -> NodeResult {
    let node_id = self.node.node_id.as_str();
    let mut result = NodeResult::new(node_id, NodeStatus::Succeeded, None);

    let scope = match ArtifactName::parse(self.execution_id.as_str()) {
      Ok(scope) => scope,
      Err(e) => {
        result.status = NodeStatus::Failed;
        result.message = Some(e.to_string());
        return result;
      }
    };

    let ctx = match self.prepare().await {
      Ok(ctx) => ctx,
      Err(message) => {
        warn!(execution_id = %self.execution_id, node_id = %node_id, error = %message, "node_setup_failed");
        result.status = NodeStatus::Failed;
        result.message = Some(message);
        return result;
      }
    };

    let body = tokio::time::timeout(
      self.timeout,
      self.run_body(&ctx, &scope, cancel, &mut result.steps),
    )
    .await;

    match body {
      Ok(Ok(())) => {}
      Ok(Err(Halt::Failed(message))) => {
        result.status = NodeStatus::Failed;
        result.message = Some(message);
      }
      Ok(Err(Halt::Cancelled)) => {
        result.status = NodeStatus::Cancelled;
        result.message = Some("cancelled".to_string());
        return result;
      }
      Err(_) => {
        result.status = NodeStatus::TimedOut;
        result.message = Some(format!("timed out after {}ms", self.timeout.as_millis()));
      }
    }

    self.publish_all(&ctx, &scope, &mut result).await;
    result
  }

  /// Create the working directory and build the step environment.
  async fn prepare(&self) -> Result<StepContext, String> {
    let work_dir = self
      .work_root
      .join(&self.execution_id)
      .join(dir_name(&self.node.node_id));
    tokio::fs::create_dir_all(&work_dir)
      .await
      .map_err(|e| format!("failed to create {}: {}", work_dir.display(), e))?;

    let mut env = BTreeMap::new();
    env.insert("WEFT_EXECUTION_ID".to_string(), self.execution_id.clone());
    env.insert("WEFT_NODE_ID".to_string(), self.node.node_id.clone());
    env.insert("WEFT_JOB_ID".to_string(), self.node.job_id.clone());
    for (name, value) in &self.node.inputs {
      env.insert(format!("INPUT_{}", env_key(name)), env_value(value));
    }
    for (axis, value) in &self.node.matrix {
      env.insert(format!("MATRIX_{}", env_key(axis)), env_value(value));
    }

    let mut secrets = BTreeMap::new();
    for (unit_secret, source) in &self.node.secrets {
      let value = self
        .secrets
        .get(source)
        .ok_or_else(|| format!("secret '{}' is not available", source))?;
      secrets.insert(format!("SECRET_{}", env_key(unit_secret)), value);
    }

    Ok(StepContext {
      execution_id: self.execution_id.clone(),
      node_id: self.node.node_id.clone(),
      unit: self.node.unit.clone(),
      work_dir,
      env,
      secrets,
    })
  }

  async fn run_body(
    &self,
    ctx: &StepContext,
    scope: &ArtifactName,
    cancel: &CancellationToken,
    records: &mut Vec<StepRecord>,
  ) -> Result<(), Halt> {
    for download in &self.node.downloads {
      if cancel.is_cancelled() {
        return Err(Halt::Cancelled);
      }
      self.download(ctx, scope, download).await.map_err(Halt::Failed)?;
    }

    for step in &self.steps {
      info!(
        execution_id = %self.execution_id,
        node_id = %self.node.node_id,
        step = %step.name,
        "step_started"
      );

      let outcome = match self.executor.execute(step, ctx, cancel.clone()).await {
        Ok(outcome) => outcome,
        Err(ExecutorError::Cancelled) => return Err(Halt::Cancelled),
        Err(e) => {
          records.push(StepRecord {
            name: step.name.clone(),
            exit_code: None,
          });
          return Err(Halt::Failed(format!("step '{}': {}", step.name, e)));
        }
      };

      records.push(StepRecord {
        name: step.name.clone(),
        exit_code: outcome.exit_code,
      });

      if !outcome.succeeded() {
        let code = outcome
          .exit_code
          .map(|c| c.to_string())
          .unwrap_or_else(|| "signal".to_string());
        let mut message = format!("step '{}' exited with {}", step.name, code);
        if let Some(summary) = outcome.summary {
          message.push_str(": ");
          message.push_str(&summary);
        }
        warn!(
          execution_id = %self.execution_id,
          node_id = %self.node.node_id,
          step = %step.name,
          exit_code = ?outcome.exit_code,
          "step_failed"
        );
        return Err(Halt::Failed(message));
      }
    }

    Ok(())
  }

  async fn download(
    &self,
    ctx: &StepContext,
    scope: &ArtifactName,
    download: &LockedDownload,
  ) -> Result<(), String> {
    let target = safe_join(&ctx.work_dir, &download.path)
      .ok_or_else(|| format!("download path '{}' escapes the working directory", download.path))?;
    let name = ArtifactName::parse(download.artifact.as_str()).map_err(|e| e.to_string())?;
    let scoped = scope.join(&name);

    if let Some(parent) = target.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| format!("failed to create {}: {}", parent.display(), e))?;
    }

    match self.store.fetch(&scoped).await {
      Ok(stream) => write_stream(&target, stream)
        .await
        .map_err(|e| format!("failed to download '{}': {}", name, e)),
      Err(weft_artifact::Error::NotFound(_)) => match &download.default {
        Some(default) => {
          info!(
            execution_id = %self.execution_id,
            node_id = %self.node.node_id,
            artifact = %name,
            "artifact_default_used"
          );
          tokio::fs::write(&target, default.as_bytes())
            .await
            .map_err(|e| format!("failed to write default for '{}': {}", name, e))
        }
        None => Err(format!("artifact not found: {}", name)),
      },
      Err(e) => Err(format!("failed to download '{}': {}", name, e)),
    }
  }

  /// Publish after the body. A successful node publishes everything and fails
  /// if a declared file is missing; otherwise only `always` publishes whose
  /// file exists are uploaded.
  async fn publish_all(&self, ctx: &StepContext, scope: &ArtifactName, result: &mut NodeResult) {
    for publish in &self.node.publishes {
      let succeeded = result.status == NodeStatus::Succeeded;
      if !succeeded && !publish.always {
        continue;
      }

      match self.publish(ctx, scope, publish).await {
        Ok(Some(scoped)) => result.published.push(scoped),
        Ok(None) if !succeeded => {
          warn!(
            execution_id = %self.execution_id,
            node_id = %self.node.node_id,
            artifact = %publish.artifact,
            "always_publish_missing"
          );
        }
        Ok(None) => {
          result.status = NodeStatus::Failed;
          result.message = Some(format!(
            "artifact '{}': path '{}' does not exist",
            publish.artifact, publish.path
          ));
        }
        Err(message) if !succeeded => {
          warn!(
            execution_id = %self.execution_id,
            node_id = %self.node.node_id,
            error = %message,
            "always_publish_failed"
          );
        }
        Err(message) => {
          result.status = NodeStatus::Failed;
          result.message = Some(message);
        }
      }
    }
  }

  /// Returns the scoped name on success, `None` when the file does not exist.
  async fn publish(
    &self,
    ctx: &StepContext,
    scope: &ArtifactName,
    publish: &LockedPublish,
  ) -> Result<Option<String>, String> {
    let source = safe_join(&ctx.work_dir, &publish.path)
      .ok_or_else(|| format!("publish path '{}' escapes the working directory", publish.path))?;
    let file = match tokio::fs::File::open(&source).await {
      Ok(file) => file,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(format!("failed to open {}: {}", source.display(), e)),
    };

    let name = ArtifactName::parse(publish.artifact.as_str()).map_err(|e| e.to_string())?;
    let scoped = scope.join(&name);
    let stream: ByteStream = Box::pin(ReaderStream::new(file).map_err(weft_artifact::Error::from));

    let meta = self
      .store
      .publish(&scoped, &self.node.node_id, stream, publish.retention_days)
      .await
      .map_err(|e| format!("failed to publish '{}': {}", name, e))?;

    info!(
      execution_id = %self.execution_id,
      node_id = %self.node.node_id,
      artifact = %scoped,
      size = meta.size,
      "artifact_published"
    );
    self.notifier.notify(ExecutionEvent::ArtifactPublished {
      execution_id: self.execution_id.clone(),
      node_id: self.node.node_id.clone(),
      artifact: scoped.to_string(),
      size: meta.size,
    });

    Ok(Some(scoped.to_string()))
  }
}

async fn write_stream(target: &Path, mut stream: ByteStream) -> Result<(), weft_artifact::Error> {
  let mut file = tokio::fs::File::create(target).await?;
  while let Some(chunk) = stream.next().await {
    file.write_all(&chunk?).await?;
  }
  file.flush().await?;
  Ok(())
}

fn env_value(value: &serde_json::Value) -> String {
  match value {
    serde_json::Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Directory name for a node id, percent-encoding every byte outside
/// `[A-Za-z0-9._-]` and a leading dot: `build[service=users]` ->
/// `build%5Bservice%3Dusers%5D`. Distinct ids map to distinct names.
fn dir_name(node_id: &str) -> String {
  let mut name = String::with_capacity(node_id.len());
  for (i, byte) in node_id.bytes().enumerate() {
    let plain =
      byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-') || (byte == b'.' && i > 0);
    if plain {
      name.push(byte as char);
    } else {
      name.push_str(&format!("%{:02X}", byte));
    }
  }
  name
}

/// Join a relative path under `root`, refusing absolute paths and `..`.
fn safe_join(root: &Path, relative: &str) -> Option<PathBuf> {
  let path = Path::new(relative);
  let mut has_normal = false;
  for component in path.components() {
    match component {
      Component::Normal(_) => has_normal = true,
      Component::CurDir => {}
      _ => return None,
    }
  }
  has_normal.then(|| root.join(path))
}
