use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::job::JobDef;
use crate::trigger::TriggerDef;

/// An orchestrator definition (e.g. `ci` or `cd`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorDef {
  pub name: String,
  #[serde(rename = "on", default)]
  pub triggers: Vec<TriggerDef>,
  /// Secrets this orchestrator may hand to its units.
  #[serde(default)]
  pub secrets: BTreeSet<String>,
  pub jobs: BTreeMap<String, JobDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retention_days: Option<u32>,
}
