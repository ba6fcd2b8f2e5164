//! Execution events and notifiers for observability.
//!
//! Events are emitted during a run so that consumers can follow progress
//! without polling the report.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::result::{NodeStatus, RunStatus};

/// Events emitted during workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// A run has started.
  RunStarted {
    execution_id: String,
    workflow_id: String,
    trigger: String,
    nodes: Vec<String>,
  },

  /// A node has started executing.
  NodeStarted {
    execution_id: String,
    node_id: String,
  },

  /// A node has reached a terminal status.
  NodeFinished {
    execution_id: String,
    node_id: String,
    status: NodeStatus,
    message: Option<String>,
  },

  /// A node has published an artifact.
  ArtifactPublished {
    execution_id: String,
    node_id: String,
    artifact: String,
    size: u64,
  },

  /// A run has finished.
  RunFinished {
    execution_id: String,
    status: RunStatus,
  },
}

/// Trait for receiving execution events.
///
/// The runtime calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls scheduling. Volume is a handful
  // of events per node.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
