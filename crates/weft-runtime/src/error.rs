//! Runtime error types.

use crate::result::NodeStatus;

/// Errors surfaced to the caller of the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// No trigger of the workflow accepts the event.
  #[error("trigger not matched: {0}")]
  TriggerNotMatched(#[source] weft_workflow::WorkflowError),

  /// Invalid workflow graph structure.
  #[error("invalid graph: {message}")]
  InvalidGraph { message: String },

  /// A node did not succeed.
  #[error("node '{node_id}' {status}: {message}")]
  NodeFailed {
    node_id: String,
    status: NodeStatus,
    message: String,
  },

  /// The run was cancelled.
  #[error("execution cancelled")]
  Cancelled,
}

/// Errors reported by a [`StepExecutor`](crate::StepExecutor).
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
  /// The step process could not be started.
  #[error("failed to spawn step: {0}")]
  Spawn(#[from] std::io::Error),

  /// The step was cancelled before it finished.
  #[error("step cancelled")]
  Cancelled,

  /// Any other executor failure.
  #[error("{0}")]
  Other(String),
}
