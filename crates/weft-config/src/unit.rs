use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::enums::InputType;
use crate::input::InputValue;

/// A reusable unit definition, e.g. `docker-build` or `go-test`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDef {
  /// Unit name referenced by orchestrator jobs via `uses`.
  pub name: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,

  /// Typed inputs the unit accepts.
  #[serde(default)]
  pub inputs: BTreeMap<String, InputSpec>,

  /// Secrets the unit consumes. Every one must be passed by the caller.
  #[serde(default)]
  pub secrets: BTreeSet<String>,

  /// Steps executed in order.
  pub steps: Vec<StepDef>,

  /// Artifacts published after the steps finish.
  #[serde(default)]
  pub publish: Vec<PublishDef>,
}

/// Declaration of a single unit input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
  #[serde(rename = "type")]
  pub input_type: InputType,
  #[serde(default)]
  pub required: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<InputValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// A shell step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
  pub name: String,
  pub run: String,
}

/// Publishes a file from the unit's working directory as a named artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishDef {
  /// Artifact name template, rendered against `inputs`,
  /// e.g. `"image-{{ inputs.service }}"`.
  pub artifact: String,
  /// Path relative to the unit's working directory.
  pub path: String,
  /// Publish even when a step failed.
  #[serde(default)]
  pub always: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub retention_days: Option<u32>,
}
