use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
  #[error("node not found: {0}")]
  NodeNotFound(String),

  #[error("cycle detected among nodes: {}", .0.join(", "))]
  CycleDetected(Vec<String>),

  #[error("no trigger matches {event} on branch '{branch}'")]
  NoMatchingTrigger { event: String, branch: String },

  #[error("trigger references unknown job: {0}")]
  UnknownTriggerJob(String),
}
