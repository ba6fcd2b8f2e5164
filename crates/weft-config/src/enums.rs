use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type of a unit input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
  String,
  Number,
  Boolean,
}

impl fmt::Display for InputType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InputType::String => f.write_str("string"),
      InputType::Number => f.write_str("number"),
      InputType::Boolean => f.write_str("boolean"),
    }
  }
}

/// Kind of event that can trigger an orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  Push,
  PullRequest,
  Manual,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EventKind::Push => f.write_str("push"),
      EventKind::PullRequest => f.write_str("pull_request"),
      EventKind::Manual => f.write_str("manual"),
    }
  }
}
