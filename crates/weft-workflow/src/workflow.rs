use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use weft_config::TriggerDef;

use crate::contract::UnitContract;
use crate::error::WorkflowError;
use crate::graph::Graph;
use crate::node::JobNode;
use crate::trigger::Trigger;

/// A composed workflow ready for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
  pub workflow_id: String,
  pub name: String,
  pub contracts: BTreeMap<String, UnitContract>,
  pub nodes: BTreeMap<String, JobNode>,
  pub edges: Vec<(String, String)>,
  pub triggers: Vec<TriggerDef>,
  pub timeout_ms: Option<u64>,
  pub retention_days: Option<u32>,
}

impl Workflow {
  /// Build the graph structure for traversal.
  pub fn graph(&self) -> Graph {
    Graph::new(&self.nodes, &self.edges)
  }

  /// Get a node by ID.
  pub fn get_node(&self, node_id: &str) -> Option<&JobNode> {
    self.nodes.get(node_id)
  }

  /// Get the contract a node was validated against.
  pub fn contract_for(&self, node: &JobNode) -> Option<&UnitContract> {
    self.contracts.get(&node.unit)
  }

  /// All node ids instantiated from a job (one per matrix combination).
  pub fn nodes_for_job(&self, job_id: &str) -> Vec<String> {
    self
      .nodes
      .values()
      .filter(|n| n.job_id == job_id)
      .map(|n| n.node_id.clone())
      .collect()
  }

  /// Nodes in a deterministic topological order.
  pub fn topological_order(&self) -> Result<Vec<String>, WorkflowError> {
    self.graph().topological_order()
  }

  /// Select the nodes a trigger schedules.
  ///
  /// The first matching trigger wins. Its job list (every job when empty)
  /// is closed over `needs` so that every scheduled node has its
  /// predecessors scheduled too.
  pub fn select(&self, trigger: &Trigger) -> Result<BTreeSet<String>, WorkflowError> {
    let def = self
      .triggers
      .iter()
      .find(|def| trigger.matches(def))
      .ok_or_else(|| WorkflowError::NoMatchingTrigger {
        event: trigger.event.to_string(),
        branch: trigger.branch.clone(),
      })?;

    if def.jobs.is_empty() {
      return Ok(self.nodes.keys().cloned().collect());
    }

    let mut roots = Vec::new();
    for job_id in &def.jobs {
      let instances = self.nodes_for_job(job_id);
      if instances.is_empty() {
        return Err(WorkflowError::UnknownTriggerJob(job_id.clone()));
      }
      roots.extend(instances);
    }

    Ok(self.graph().upstream_closure(roots.iter().map(String::as_str)))
  }
}
