//! Execution result types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use weft_workflow::Trigger;

use crate::error::RuntimeError;

/// Terminal status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
  Succeeded,
  Failed,
  /// Not run because a predecessor did not succeed.
  Skipped,
  TimedOut,
  Cancelled,
}

impl NodeStatus {
  /// Whether dependents of a node with this status may run.
  ///
  /// An optional node that failed or timed out still lets its dependents
  /// run; skipped and cancelled nodes never do.
  pub fn permits_dependents(self, optional: bool) -> bool {
    match self {
      NodeStatus::Succeeded => true,
      NodeStatus::Failed | NodeStatus::TimedOut => optional,
      NodeStatus::Skipped | NodeStatus::Cancelled => false,
    }
  }
}

impl fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      NodeStatus::Succeeded => "succeeded",
      NodeStatus::Failed => "failed",
      NodeStatus::Skipped => "skipped",
      NodeStatus::TimedOut => "timed out",
      NodeStatus::Cancelled => "cancelled",
    };
    f.write_str(s)
  }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
  Succeeded,
  Failed,
  Cancelled,
}

impl fmt::Display for RunStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      RunStatus::Succeeded => "succeeded",
      RunStatus::Failed => "failed",
      RunStatus::Cancelled => "cancelled",
    };
    f.write_str(s)
  }
}

/// Outcome of one step of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
  pub name: String,
  pub exit_code: Option<i32>,
}

/// Result of a single node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
  pub node_id: String,
  pub status: NodeStatus,
  /// Last reported status line, e.g. the reason a node failed.
  pub message: Option<String>,
  /// Steps that ran, in order.
  pub steps: Vec<StepRecord>,
  /// Scoped names of the artifacts this node published.
  pub published: Vec<String>,
  pub duration_ms: u64,
}

impl NodeResult {
  pub(crate) fn new(node_id: &str, status: NodeStatus, message: Option<String>) -> Self {
    Self {
      node_id: node_id.to_string(),
      status,
      message,
      steps: Vec::new(),
      published: Vec::new(),
      duration_ms: 0,
    }
  }
}

/// Result of a complete invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub execution_id: String,
  pub workflow_id: String,
  pub trigger: Trigger,
  pub status: RunStatus,
  /// Results of every selected node, keyed by node_id.
  pub node_results: BTreeMap<String, NodeResult>,
  /// Node ids in the order they reached a terminal status.
  pub completion_order: Vec<String>,
}

impl RunReport {
  pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
    self.node_results.get(node_id).map(|r| r.status)
  }

  /// Turn a failed or cancelled run into an error naming the first node that
  /// did not succeed.
  pub fn ensure_success(&self) -> Result<(), RuntimeError> {
    match self.status {
      RunStatus::Succeeded => Ok(()),
      RunStatus::Cancelled => Err(RuntimeError::Cancelled),
      RunStatus::Failed => {
        // Prefer a node that failed on its own over one skipped because of it.
        let culprit = self
          .completion_order
          .iter()
          .filter_map(|id| self.node_results.get(id))
          .find(|r| matches!(r.status, NodeStatus::Failed | NodeStatus::TimedOut))
          .or_else(|| {
            self
              .completion_order
              .iter()
              .filter_map(|id| self.node_results.get(id))
              .find(|r| r.status != NodeStatus::Succeeded)
          });

        match culprit {
          Some(r) => Err(RuntimeError::NodeFailed {
            node_id: r.node_id.clone(),
            status: r.status,
            message: r.message.clone().unwrap_or_default(),
          }),
          None => Err(RuntimeError::InvalidGraph {
            message: "run failed without a failing node".to_string(),
          }),
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_optional_failure_permits_dependents() {
    assert!(NodeStatus::Succeeded.permits_dependents(false));
    assert!(NodeStatus::Failed.permits_dependents(true));
    assert!(NodeStatus::TimedOut.permits_dependents(true));
    assert!(!NodeStatus::Failed.permits_dependents(false));
    assert!(!NodeStatus::Skipped.permits_dependents(true));
    assert!(!NodeStatus::Cancelled.permits_dependents(true));
  }
}
