use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One schedulable invocation of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobNode {
  /// Unique id, `job` or `job[axis=value,...]` for matrix instances.
  pub node_id: String,
  /// The orchestrator job this node was instantiated from.
  pub job_id: String,
  /// Name of the unit contract.
  pub unit: String,
  /// Matrix values of this instance (empty when not a matrix job).
  pub matrix: BTreeMap<String, serde_json::Value>,
  /// Rendered, typed inputs with defaults applied.
  pub inputs: BTreeMap<String, serde_json::Value>,
  /// Unit secret name -> orchestrator secret name.
  pub secrets: BTreeMap<String, String>,
  /// Predecessor node ids, sorted.
  pub needs: Vec<String>,
  pub downloads: Vec<LockedDownload>,
  pub publishes: Vec<LockedPublish>,
  pub always: bool,
  pub optional: bool,
  pub timeout_ms: Option<u64>,
}

/// An artifact fetched before the node's steps run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedDownload {
  pub artifact: String,
  pub path: String,
  pub default: Option<String>,
}

/// An artifact published after the node's steps run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedPublish {
  pub artifact: String,
  pub path: String,
  pub always: bool,
  pub retention_days: u32,
}

/// Build the node id for a job instance.
///
/// ```
/// use std::collections::BTreeMap;
/// use weft_workflow::node_id_for;
///
/// let mut matrix = BTreeMap::new();
/// matrix.insert("service".to_string(), serde_json::json!("users"));
/// assert_eq!(node_id_for("build", &matrix), "build[service=users]");
/// assert_eq!(node_id_for("lint", &BTreeMap::new()), "lint");
/// ```
pub fn node_id_for(job_id: &str, matrix: &BTreeMap<String, serde_json::Value>) -> String {
  if matrix.is_empty() {
    return job_id.to_string();
  }
  let parts: Vec<String> = matrix
    .iter()
    .map(|(axis, value)| match value {
      serde_json::Value::String(s) => format!("{}={}", axis, s),
      other => format!("{}={}", axis, other),
    })
    .collect();
  format!("{}[{}]", job_id, parts.join(","))
}
