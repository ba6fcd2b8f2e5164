//! Workflow runtime.
//!
//! The [`Runtime`] owns a composed workflow and the services its nodes need,
//! and provides `invoke(trigger, cancel)` to run the nodes a trigger selects.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use weft_artifact::Store;
use weft_workflow::{JobNode, Trigger, Workflow};

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::executor::StepExecutor;
use crate::result::{NodeResult, NodeStatus, RunReport, RunStatus};
use crate::secrets::{EnvSecretProvider, SecretProvider};
use crate::unit::UnitExecution;

/// A spawned node task, tagged with its node id.
type Running = BoxFuture<'static, (String, Result<NodeResult, JoinError>)>;

/// The workflow runtime.
///
/// Nodes start as soon as every selected predecessor has reached a terminal
/// status, so independent branches run concurrently.
pub struct Runtime {
  workflow: Workflow,
  config: RuntimeConfig,
  store: Arc<dyn Store>,
  executor: Arc<dyn StepExecutor>,
  secrets: Arc<dyn SecretProvider>,
  notifier: Arc<dyn ExecutionNotifier>,
}

impl Runtime {
  /// Create a runtime. Secrets come from the environment and events are
  /// discarded until configured otherwise.
  pub fn new(
    workflow: Workflow,
    config: RuntimeConfig,
    store: Arc<dyn Store>,
    executor: Arc<dyn StepExecutor>,
  ) -> Self {
    Self {
      workflow,
      config,
      store,
      executor,
      secrets: Arc::new(EnvSecretProvider),
      notifier: Arc::new(NoopNotifier),
    }
  }

  pub fn with_secrets(mut self, secrets: Arc<dyn SecretProvider>) -> Self {
    self.secrets = secrets;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn ExecutionNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Get a reference to the workflow.
  pub fn workflow(&self) -> &Workflow {
    &self.workflow
  }

  /// Run the nodes selected by `trigger`.
  ///
  /// Node failures are reported in the returned [`RunReport`]; an `Err` means
  /// the run could not start.
  #[instrument(
    name = "runtime_invoke",
    skip(self, trigger, cancel),
    fields(workflow_id = %self.workflow.workflow_id, trigger = %trigger)
  )]
  pub async fn invoke(
    &self,
    trigger: Trigger,
    cancel: CancellationToken,
  ) -> Result<RunReport, RuntimeError> {
    self
      .workflow
      .topological_order()
      .map_err(|e| RuntimeError::InvalidGraph {
        message: e.to_string(),
      })?;
    let selected = self
      .workflow
      .select(&trigger)
      .map_err(RuntimeError::TriggerNotMatched)?;

    let execution_id = uuid::Uuid::new_v4().to_string();
    info!(
      execution_id = %execution_id,
      workflow_id = %self.workflow.workflow_id,
      nodes = ?selected,
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      execution_id: execution_id.clone(),
      workflow_id: self.workflow.workflow_id.clone(),
      trigger: trigger.to_string(),
      nodes: selected.iter().cloned().collect(),
    });

    let mut report = RunReport {
      execution_id: execution_id.clone(),
      workflow_id: self.workflow.workflow_id.clone(),
      trigger,
      status: RunStatus::Succeeded,
      node_results: BTreeMap::new(),
      completion_order: Vec::new(),
    };

    self
      .run_execution_loop(&selected, &mut report, &cancel)
      .await;
    self.cleanup_work_dir(&execution_id).await;

    report.status = self.run_status(&selected, &report);
    match report.status {
      RunStatus::Succeeded => info!(execution_id = %execution_id, "run_succeeded"),
      RunStatus::Failed => error!(execution_id = %execution_id, "run_failed"),
      RunStatus::Cancelled => warn!(execution_id = %execution_id, "run_cancelled"),
    }
    self.notifier.notify(ExecutionEvent::RunFinished {
      execution_id,
      status: report.status,
    });

    Ok(report)
  }

  /// Execute a single node in isolation, without walking the graph.
  ///
  /// Downloads resolve against a fresh execution scope, so only artifacts
  /// with a declared default can be satisfied.
  #[instrument(
    name = "runtime_invoke_node",
    skip(self, cancel),
    fields(workflow_id = %self.workflow.workflow_id, node_id = %node_id)
  )]
  pub async fn invoke_node(
    &self,
    node_id: &str,
    cancel: CancellationToken,
  ) -> Result<NodeResult, RuntimeError> {
    let node = self
      .workflow
      .get_node(node_id)
      .ok_or_else(|| RuntimeError::InvalidGraph {
        message: format!("node '{}' not found in workflow", node_id),
      })?;

    let execution_id = uuid::Uuid::new_v4().to_string();
    info!(execution_id = %execution_id, node_id = %node_id, "invoke_node_started");

    let unit = self.unit_execution(node, &execution_id)?;
    let result = unit.run(cancel).await;
    self.cleanup_work_dir(&execution_id).await;

    info!(
      execution_id = %execution_id,
      node_id = %node_id,
      status = %result.status,
      "invoke_node_finished"
    );
    Ok(result)
  }

  /// Schedule until every selected node has a result.
  async fn run_execution_loop(
    &self,
    selected: &BTreeSet<String>,
    report: &mut RunReport,
    cancel: &CancellationToken,
  ) {
    let execution_id = report.execution_id.clone();
    let mut started: BTreeSet<String> = BTreeSet::new();
    let mut running: FuturesUnordered<Running> = FuturesUnordered::new();

    loop {
      if !cancel.is_cancelled() {
        self.schedule_ready(selected, report, &mut started, &mut running, cancel);
      }

      if running.is_empty() {
        break;
      }

      tokio::select! {
        Some((node_id, joined)) = running.next() => {
          let result = joined.unwrap_or_else(|e| {
            NodeResult::new(&node_id, NodeStatus::Failed, Some(format!("task failed: {}", e)))
          });
          self.record(report, result);
        }
        // Node tasks hold child tokens and wind down on their own; keep
        // draining them so their processes are gone before returning.
        _ = cancel.cancelled(), if !cancel.is_cancelled() => {
          warn!(execution_id = %execution_id, running = running.len(), "cancellation_requested");
        }
        else => break,
      }
    }

    if cancel.is_cancelled() {
      for node_id in selected {
        if !report.node_results.contains_key(node_id) {
          let result = NodeResult::new(
            node_id,
            NodeStatus::Cancelled,
            Some("run cancelled before node started".to_string()),
          );
          self.record(report, result);
        }
      }
    }
  }

  /// Start or skip every node whose predecessors are all terminal.
  fn schedule_ready(
    &self,
    selected: &BTreeSet<String>,
    report: &mut RunReport,
    started: &mut BTreeSet<String>,
    running: &mut FuturesUnordered<Running>,
    cancel: &CancellationToken,
  ) {
    // Skips are terminal immediately and may unblock further decisions.
    loop {
      let ready = self.find_ready_nodes(selected, report, started);
      if ready.is_empty() {
        return;
      }

      for node in ready {
        started.insert(node.node_id.clone());

        if let Some(reason) = self.blocked_by(node, selected, report)
          && !node.always
        {
          info!(
            execution_id = %report.execution_id,
            node_id = %node.node_id,
            reason = %reason,
            "node_skipped"
          );
          self.record(
            report,
            NodeResult::new(&node.node_id, NodeStatus::Skipped, Some(reason)),
          );
          continue;
        }

        let unit = match self.unit_execution(node, &report.execution_id) {
          Ok(unit) => unit,
          Err(e) => {
            self.record(
              report,
              NodeResult::new(&node.node_id, NodeStatus::Failed, Some(e.to_string())),
            );
            continue;
          }
        };

        info!(
          execution_id = %report.execution_id,
          node_id = %node.node_id,
          timeout_ms = unit.timeout.as_millis() as u64,
          "node_started"
        );
        self.notifier.notify(ExecutionEvent::NodeStarted {
          execution_id: report.execution_id.clone(),
          node_id: node.node_id.clone(),
        });

        let node_id = node.node_id.clone();
        let handle = tokio::spawn(unit.run(cancel.child_token()));
        running.push(Box::pin(async move { (node_id, handle.await) }));
      }
    }
  }

  /// Selected nodes not yet started whose selected predecessors all have a result.
  fn find_ready_nodes(
    &self,
    selected: &BTreeSet<String>,
    report: &RunReport,
    started: &BTreeSet<String>,
  ) -> Vec<&JobNode> {
    selected
      .iter()
      .filter(|id| !started.contains(*id))
      .filter_map(|id| self.workflow.get_node(id))
      .filter(|node| {
        node
          .needs
          .iter()
          .filter(|up| selected.contains(*up))
          .all(|up| report.node_results.contains_key(up))
      })
      .collect()
  }

  /// The reason a node may not run, if any predecessor blocks it.
  fn blocked_by(
    &self,
    node: &JobNode,
    selected: &BTreeSet<String>,
    report: &RunReport,
  ) -> Option<String> {
    node
      .needs
      .iter()
      .filter(|up| selected.contains(*up))
      .find_map(|up| {
        let result = report.node_results.get(up)?;
        let optional = self.workflow.get_node(up).is_some_and(|n| n.optional);
        (!result.status.permits_dependents(optional))
          .then(|| format!("predecessor '{}' {}", up, result.status))
      })
  }

  fn unit_execution(
    &self,
    node: &JobNode,
    execution_id: &str,
  ) -> Result<UnitExecution, RuntimeError> {
    let contract = self
      .workflow
      .contract_for(node)
      .ok_or_else(|| RuntimeError::InvalidGraph {
        message: format!("node '{}' references unknown unit '{}'", node.node_id, node.unit),
      })?;

    Ok(UnitExecution {
      execution_id: execution_id.to_string(),
      node: node.clone(),
      steps: contract.steps.clone(),
      work_root: self.config.work_dir.clone(),
      timeout: self.timeout_for(node),
      store: self.store.clone(),
      executor: self.executor.clone(),
      secrets: self.secrets.clone(),
      notifier: self.notifier.clone(),
    })
  }

  /// Job timeout, then the orchestrator's, then the runtime default.
  fn timeout_for(&self, node: &JobNode) -> Duration {
    node
      .timeout_ms
      .or(self.workflow.timeout_ms)
      .map(Duration::from_millis)
      .unwrap_or(self.config.default_timeout)
  }

  fn record(&self, report: &mut RunReport, result: NodeResult) {
    match result.status {
      NodeStatus::Succeeded => info!(
        execution_id = %report.execution_id,
        node_id = %result.node_id,
        duration_ms = result.duration_ms,
        "node_succeeded"
      ),
      NodeStatus::Skipped => {}
      status => error!(
        execution_id = %report.execution_id,
        node_id = %result.node_id,
        status = %status,
        message = result.message.as_deref().unwrap_or_default(),
        "node_not_succeeded"
      ),
    }

    self.notifier.notify(ExecutionEvent::NodeFinished {
      execution_id: report.execution_id.clone(),
      node_id: result.node_id.clone(),
      status: result.status,
      message: result.message.clone(),
    });
    report.completion_order.push(result.node_id.clone());
    report.node_results.insert(result.node_id.clone(), result);
  }

  /// Remove the run's working directories unless configured to keep them.
  async fn cleanup_work_dir(&self, execution_id: &str) {
    if self.config.keep_work_dirs {
      return;
    }
    let dir = self.config.work_dir.join(execution_id);
    match tokio::fs::remove_dir_all(&dir).await {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => warn!(
        execution_id = %execution_id,
        path = %dir.display(),
        error = %e,
        "work_dir_cleanup_failed"
      ),
    }
  }

  /// Succeeded iff every non-optional selected node succeeded.
  fn run_status(&self, selected: &BTreeSet<String>, report: &RunReport) -> RunStatus {
    let results = || selected.iter().filter_map(|id| report.node_results.get(id));

    if results().any(|r| r.status == NodeStatus::Cancelled) {
      return RunStatus::Cancelled;
    }

    let all_required_succeeded = results().all(|r| {
      r.status == NodeStatus::Succeeded
        || self
          .workflow
          .get_node(&r.node_id)
          .is_some_and(|n| n.optional)
    });
    if all_required_succeeded {
      RunStatus::Succeeded
    } else {
      RunStatus::Failed
    }
  }
}
