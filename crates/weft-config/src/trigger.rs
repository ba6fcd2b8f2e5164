use serde::{Deserialize, Serialize};

use crate::enums::EventKind;

/// Maps an event kind and branch filter to the jobs it schedules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDef {
  pub event: EventKind,
  /// Branch globs (`*` wildcard). Empty matches every branch.
  #[serde(default)]
  pub branches: Vec<String>,
  /// Top-level jobs to schedule. Empty schedules every job.
  #[serde(default)]
  pub jobs: Vec<String>,
}
