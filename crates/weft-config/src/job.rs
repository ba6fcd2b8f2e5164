use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::input::InputValue;

/// A job inside an orchestrator: one invocation of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDef {
  /// Name of the unit to invoke.
  pub uses: String,

  /// Inputs passed to the unit.
  #[serde(default)]
  pub with: BTreeMap<String, InputValue>,

  /// Secrets passed to the unit: unit secret name -> orchestrator secret name.
  #[serde(default)]
  pub secrets: BTreeMap<String, String>,

  /// Jobs that must reach a terminal state first.
  #[serde(default)]
  pub needs: Vec<String>,

  /// Matrix axes. The job is instantiated once per combination.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matrix: Option<BTreeMap<String, Vec<InputValue>>>,

  /// Artifacts fetched into the working directory before the first step.
  #[serde(default)]
  pub downloads: Vec<ArtifactInput>,

  /// Run even when a predecessor failed or was skipped.
  #[serde(default)]
  pub always: bool,

  /// Failure of this job does not fail the run.
  #[serde(default)]
  pub optional: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timeout_ms: Option<u64>,
}

/// An artifact consumed by a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInput {
  /// Artifact name template, rendered against `matrix`.
  pub name: String,
  /// Destination relative to the working directory (defaults to the name).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  /// Payload written when the artifact does not exist.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<String>,
}
