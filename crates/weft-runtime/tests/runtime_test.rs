//! Scheduling tests for Runtime using a scripted step executor.
//!
//! Each unit step runs the `script` input of its job. Scripts are `;`
//! separated commands understood by [`ScriptedExecutor`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Barrier, mpsc};
use tokio_util::sync::CancellationToken;
use weft_artifact::{ArtifactName, MemoryStore, Store, read_all};
use weft_config::{EventKind, Format, StepDef, UnitDef, parse_orchestrator, parse_unit};
use weft_resolver::{Resolver, StandardResolver};
use weft_runtime::{
  ChannelNotifier, ExecutionEvent, ExecutorError, NodeStatus, RunStatus, Runtime, RuntimeConfig,
  RuntimeError, StaticSecrets, StepContext, StepExecutor, StepOutcome,
};
use weft_unit_registry::{RegistryError, UnitRegistry};
use weft_workflow::{Trigger, Workflow};

/// Interprets job scripts:
/// - `ok` / `fail`
/// - `write <path> <content>` / `expect <path> <content>`
/// - `expect-env <VAR> <value>`
/// - `sleep <ms>` (honours cancellation)
/// - `barrier` (waits for the other concurrent node)
struct ScriptedExecutor {
  barrier: Arc<Barrier>,
}

impl ScriptedExecutor {
  fn new() -> Self {
    Self {
      barrier: Arc::new(Barrier::new(2)),
    }
  }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
  async fn execute(
    &self,
    _step: &StepDef,
    ctx: &StepContext,
    cancel: CancellationToken,
  ) -> Result<StepOutcome, ExecutorError> {
    let script = ctx.env.get("INPUT_SCRIPT").cloned().unwrap_or_default();
    for command in script.split(';').map(str::trim).filter(|c| !c.is_empty()) {
      let parts: Vec<&str> = command.split_whitespace().collect();
      match parts.as_slice() {
        ["ok"] => {}
        ["fail"] => return Ok(StepOutcome::failure(1, "boom")),
        ["write", path, content] => {
          std::fs::write(ctx.work_dir.join(path), content).map_err(ExecutorError::Spawn)?;
        }
        ["expect", path, content] => {
          let found = std::fs::read_to_string(ctx.work_dir.join(path)).unwrap_or_default();
          if found.trim() != *content {
            return Ok(StepOutcome::failure(2, format!("{} was '{}'", path, found)));
          }
        }
        ["expect-env", var, value] => {
          let found = ctx
            .env
            .get(*var)
            .cloned()
            .or_else(|| ctx.secrets.get(*var).map(|s| s.expose().to_string()));
          if found.as_deref() != Some(*value) {
            return Ok(StepOutcome::failure(2, format!("{} was {:?}", var, found)));
          }
        }
        ["sleep", ms] => {
          let ms: u64 = ms.parse().map_err(|_| ExecutorError::Other("bad sleep".into()))?;
          tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
            _ = cancel.cancelled() => return Err(ExecutorError::Cancelled),
          }
        }
        ["barrier"] => {
          self.barrier.wait().await;
        }
        other => return Err(ExecutorError::Other(format!("unknown command {:?}", other))),
      }
    }
    Ok(StepOutcome::success())
  }
}

struct MockRegistry {
  units: HashMap<String, UnitDef>,
}

#[async_trait]
impl UnitRegistry for MockRegistry {
  async fn get(&self, name: &str) -> Result<Option<UnitDef>, RegistryError> {
    Ok(self.units.get(name).cloned())
  }

  async fn list(&self) -> Result<Vec<UnitDef>, RegistryError> {
    Ok(self.units.values().cloned().collect())
  }
}

const TASK: &str = r#"
name: task
inputs:
  script:
    type: string
    default: ok
steps:
  - name: run
    run: script
"#;

const DEPLOYER: &str = r#"
name: deployer
inputs:
  script:
    type: string
    default: ok
secrets: [token]
steps:
  - name: run
    run: script
"#;

const REPORTER: &str = r#"
name: reporter
inputs:
  script:
    type: string
    default: ok
  name:
    type: string
    default: report
steps:
  - name: run
    run: script
publish:
  - artifact: "{{ inputs.name }}"
    path: report.txt
    always: true
"#;

const BUILDER: &str = r#"
name: builder
inputs:
  script:
    type: string
    default: ok
  name:
    type: string
    required: true
steps:
  - name: run
    run: script
publish:
  - artifact: "{{ inputs.name }}"
    path: out.bin
"#;

async fn compose(yaml: &str) -> Workflow {
  let units = [TASK, DEPLOYER, REPORTER, BUILDER]
    .iter()
    .map(|y| parse_unit(y, Format::Yaml).unwrap())
    .map(|u| (u.name.clone(), u))
    .collect();
  let def = parse_orchestrator(yaml, Format::Yaml).unwrap();
  StandardResolver::new(MockRegistry { units })
    .resolve(def)
    .await
    .unwrap()
}

struct Harness {
  runtime: Runtime,
  store: Arc<MemoryStore>,
  events: mpsc::UnboundedReceiver<ExecutionEvent>,
  _work: tempfile::TempDir,
}

async fn harness(yaml: &str) -> Harness {
  let work = tempfile::tempdir().unwrap();
  let store = Arc::new(MemoryStore::new());
  let (tx, events) = mpsc::unbounded_channel();
  let config = RuntimeConfig {
    work_dir: work.path().to_path_buf(),
    ..RuntimeConfig::default()
  };
  let runtime = Runtime::new(
    compose(yaml).await,
    config,
    store.clone(),
    Arc::new(ScriptedExecutor::new()),
  )
  .with_secrets(Arc::new(StaticSecrets::new().with("deploy_token", "abc")))
  .with_notifier(Arc::new(ChannelNotifier::new(tx)));

  Harness {
    runtime,
    store,
    events,
    _work: work,
  }
}

fn push() -> Trigger {
  Trigger::new(EventKind::Push, "main")
}

fn drain(events: &mut mpsc::UnboundedReceiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
  let mut out = Vec::new();
  while let Ok(event) = events.try_recv() {
    out.push(event);
  }
  out
}

async fn fetch(store: &MemoryStore, execution_id: &str, name: &str) -> Option<String> {
  let scoped = ArtifactName::parse(format!("{}/{}", execution_id, name)).unwrap();
  let stream = store.fetch(&scoped).await.ok()?;
  let bytes = read_all(stream).await.unwrap();
  Some(String::from_utf8(bytes.to_vec()).unwrap())
}

const PIPELINE: &str = r#"
name: ci
on:
  - event: push
jobs:
  test:
    uses: task
  build:
    uses: builder
    needs: [test]
    with:
      name: image
      script: write out.bin built
  deploy:
    uses: task
    needs: [build]
    downloads:
      - name: image
    with:
      script: expect image built
"#;

#[tokio::test]
async fn test_runs_in_dependency_order() {
  let mut h = harness(PIPELINE).await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status, RunStatus::Succeeded);
  assert_eq!(report.completion_order, vec!["test", "build", "deploy"]);
  report.ensure_success().unwrap();

  // Every node starts only after its predecessor finished.
  let events = drain(&mut h.events);
  let test_done = events
    .iter()
    .position(|e| matches!(e, ExecutionEvent::NodeFinished { node_id, .. } if node_id == "test"))
    .unwrap();
  let build_start = events
    .iter()
    .position(|e| matches!(e, ExecutionEvent::NodeStarted { node_id, .. } if node_id == "build"))
    .unwrap();
  assert!(test_done < build_start);
  assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { .. })));
  assert!(matches!(
    events.last(),
    Some(ExecutionEvent::RunFinished {
      status: RunStatus::Succeeded,
      ..
    })
  ));

  let image = fetch(&h.store, &report.execution_id, "image").await;
  assert_eq!(image.as_deref(), Some("built"));
}

#[tokio::test]
async fn test_failure_skips_dependents() {
  let h = harness(&PIPELINE.replace("    uses: task\n  build:", "    uses: task\n    with:\n      script: fail\n  build:")).await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status, RunStatus::Failed);
  assert_eq!(report.status_of("test"), Some(NodeStatus::Failed));
  assert_eq!(report.status_of("build"), Some(NodeStatus::Skipped));
  assert_eq!(report.status_of("deploy"), Some(NodeStatus::Skipped));
  assert_eq!(report.node_results["test"].steps[0].exit_code, Some(1));

  match report.ensure_success() {
    Err(RuntimeError::NodeFailed { node_id, status, message }) => {
      assert_eq!(node_id, "test");
      assert_eq!(status, NodeStatus::Failed);
      assert!(message.contains("boom"), "message: {}", message);
    }
    other => panic!("expected NodeFailed, got {:?}", other),
  }
}

#[tokio::test]
async fn test_independent_nodes_run_concurrently() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  test:
    uses: task
    with:
      script: barrier
  scan:
    uses: task
    with:
      script: barrier
  build:
    uses: task
    needs: [test, scan]
"#,
  )
  .await;

  // The barrier only opens when test and scan run at the same time.
  let report = tokio::time::timeout(
    Duration::from_secs(10),
    h.runtime.invoke(push(), CancellationToken::new()),
  )
  .await
  .expect("test and scan did not run concurrently")
  .unwrap();

  assert_eq!(report.status, RunStatus::Succeeded);
  assert_eq!(report.completion_order.last().map(String::as_str), Some("build"));
}

#[tokio::test]
async fn test_always_artifact_survives_failure() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  test:
    uses: reporter
    with:
      script: write report.txt 3-failures; fail
  inspect:
    uses: task
    needs: [test]
    always: true
    downloads:
      - name: report
    with:
      script: expect report 3-failures
  build:
    uses: builder
    with:
      name: image
      script: write out.bin partial; fail
"#,
  )
  .await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status_of("test"), Some(NodeStatus::Failed));
  assert_eq!(
    fetch(&h.store, &report.execution_id, "report").await.as_deref(),
    Some("3-failures")
  );
  assert_eq!(
    report.node_results["test"].published,
    vec![format!("{}/report", report.execution_id)]
  );
  // Non-always artifacts are not published by a failed node.
  assert_eq!(fetch(&h.store, &report.execution_id, "image").await, None);
  // An always dependent of the failed producer still receives the artifact.
  assert_eq!(report.status_of("inspect"), Some(NodeStatus::Succeeded));
}

#[tokio::test]
async fn test_missing_publish_path_fails_node() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  build:
    uses: builder
    with:
      name: image
"#,
  )
  .await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status_of("build"), Some(NodeStatus::Failed));
  let message = report.node_results["build"].message.clone().unwrap();
  assert!(message.contains("does not exist"), "message: {}", message);
}

#[tokio::test]
async fn test_optional_failure_is_tolerated() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  lint:
    uses: task
    optional: true
    with:
      script: fail
  build:
    uses: task
    needs: [lint]
"#,
  )
  .await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status_of("lint"), Some(NodeStatus::Failed));
  assert_eq!(report.status_of("build"), Some(NodeStatus::Succeeded));
  assert_eq!(report.status, RunStatus::Succeeded);
}

#[tokio::test]
async fn test_always_node_runs_after_failure() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  test:
    uses: task
    with:
      script: fail
  notify:
    uses: task
    needs: [test]
    always: true
"#,
  )
  .await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status_of("notify"), Some(NodeStatus::Succeeded));
  assert_eq!(report.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_timeout_marks_node_timed_out() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  slow:
    uses: task
    timeout_ms: 50
    with:
      script: sleep 10000
  after:
    uses: task
    needs: [slow]
"#,
  )
  .await;

  let started = Instant::now();
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert!(started.elapsed() < Duration::from_secs(5));
  assert_eq!(report.status_of("slow"), Some(NodeStatus::TimedOut));
  assert_eq!(report.status_of("after"), Some(NodeStatus::Skipped));
  assert_eq!(report.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_cancellation_stops_run() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  slow:
    uses: task
    with:
      script: sleep 10000
  after:
    uses: task
    needs: [slow]
"#,
  )
  .await;

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.cancel();
  });

  let started = Instant::now();
  let report = h.runtime.invoke(push(), cancel).await.unwrap();

  assert!(started.elapsed() < Duration::from_secs(5));
  assert_eq!(report.status, RunStatus::Cancelled);
  assert_eq!(report.status_of("slow"), Some(NodeStatus::Cancelled));
  assert_eq!(report.status_of("after"), Some(NodeStatus::Cancelled));
  assert!(matches!(report.ensure_success(), Err(RuntimeError::Cancelled)));
}

#[tokio::test]
async fn test_trigger_selects_upstream_closure() {
  let h = harness(&PIPELINE.replace(
    "  - event: push\n",
    "  - event: pull_request\n    jobs: [build]\n  - event: push\n    branches: [main]\n",
  ))
  .await;

  let report = h
    .runtime
    .invoke(
      Trigger::new(EventKind::PullRequest, "feature/x"),
      CancellationToken::new(),
    )
    .await
    .unwrap();
  assert_eq!(report.completion_order, vec!["test", "build"]);
  assert_eq!(report.status, RunStatus::Succeeded);

  let result = h
    .runtime
    .invoke(
      Trigger::new(EventKind::Push, "release"),
      CancellationToken::new(),
    )
    .await;
  assert!(matches!(result, Err(RuntimeError::TriggerNotMatched(_))));
}

#[tokio::test]
async fn test_missing_artifact_fails_without_default() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  deploy:
    uses: task
    downloads:
      - name: manifest
"#,
  )
  .await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status_of("deploy"), Some(NodeStatus::Failed));
  let message = report.node_results["deploy"].message.clone().unwrap();
  assert!(message.contains("artifact not found"), "message: {}", message);
  assert!(report.node_results["deploy"].steps.is_empty());
}

#[tokio::test]
async fn test_artifact_default_is_used() {
  let h = harness(
    r#"
name: ci
on:
  - event: push
jobs:
  deploy:
    uses: task
    downloads:
      - name: manifest
        path: manifest.yaml
        default: fallback
    with:
      script: expect manifest.yaml fallback
"#,
  )
  .await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status_of("deploy"), Some(NodeStatus::Succeeded));
}

#[tokio::test]
async fn test_matrix_instances_exchange_artifacts() {
  let h = harness(
    r#"
name: cd
on:
  - event: push
jobs:
  build:
    uses: builder
    matrix:
      service: [users, orders]
    with:
      name: "image-{{ matrix.service }}"
      script: "write out.bin {{ matrix.service }}"
  deploy:
    uses: task
    needs: [build]
    matrix:
      service: [users, orders]
    downloads:
      - name: "image-{{ matrix.service }}"
        path: image.tar
    with:
      script: "expect image.tar {{ matrix.service }}; expect-env MATRIX_SERVICE {{ matrix.service }}"
"#,
  )
  .await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(report.status, RunStatus::Succeeded, "{:?}", report.node_results);
  assert_eq!(report.node_results.len(), 4);
  assert_eq!(
    report.status_of("deploy[service=orders]"),
    Some(NodeStatus::Succeeded)
  );
}

#[tokio::test]
async fn test_secrets_are_injected() {
  let yaml = r#"
name: cd
on:
  - event: push
secrets: [deploy_token]
jobs:
  deploy:
    uses: deployer
    secrets:
      token: deploy_token
    with:
      script: expect-env SECRET_TOKEN abc
"#;
  let h = harness(yaml).await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(report.status_of("deploy"), Some(NodeStatus::Succeeded));

  // Without the secret the node fails before running any step.
  let runtime = Runtime::new(
    compose(yaml).await,
    RuntimeConfig {
      work_dir: h._work.path().to_path_buf(),
      ..RuntimeConfig::default()
    },
    Arc::new(MemoryStore::new()),
    Arc::new(ScriptedExecutor::new()),
  )
  .with_secrets(Arc::new(StaticSecrets::new()));
  let report = runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(report.status_of("deploy"), Some(NodeStatus::Failed));
}

#[tokio::test]
async fn test_work_dir_removed_after_run() {
  let h = harness(PIPELINE).await;
  let report = h
    .runtime
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(report.status, RunStatus::Succeeded);
  assert!(!h._work.path().join(&report.execution_id).exists());

  let kept = Runtime::new(
    compose(PIPELINE).await,
    RuntimeConfig {
      work_dir: h._work.path().to_path_buf(),
      keep_work_dirs: true,
      ..RuntimeConfig::default()
    },
    Arc::new(MemoryStore::new()),
    Arc::new(ScriptedExecutor::new()),
  );
  let report = kept
    .invoke(push(), CancellationToken::new())
    .await
    .unwrap();
  assert!(
    h._work
      .path()
      .join(&report.execution_id)
      .join("build")
      .join("out.bin")
      .exists()
  );
}

#[tokio::test]
async fn test_invoke_node_runs_in_isolation() {
  let h = harness(PIPELINE).await;
  let result = h
    .runtime
    .invoke_node("build", CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(result.status, NodeStatus::Succeeded);
  assert_eq!(result.published.len(), 1);

  let missing = h
    .runtime
    .invoke_node("nope", CancellationToken::new())
    .await;
  assert!(matches!(missing, Err(RuntimeError::InvalidGraph { .. })));
}
