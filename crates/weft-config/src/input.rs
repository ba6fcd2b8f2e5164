//! Input values passed from an orchestrator job to a unit.
//!
//! String values are minijinja templates rendered at composition time, so a
//! matrix job can write:
//!
//! ```yaml
//! with:
//!   service: "{{ matrix.service }}"
//!   context: "services/{{ matrix.service }}"
//!   push: true
//! ```
//!
//! After rendering, the value is coerced to the type declared by the unit's
//! contract. Numbers and booleans pass through untouched when the declared
//! type matches.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A literal or templated input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
  Bool(bool),
  Number(serde_json::Number),
  String(String),
}

impl InputValue {
  /// Convert to a JSON value for template contexts.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      InputValue::Bool(b) => serde_json::Value::Bool(*b),
      InputValue::Number(n) => serde_json::Value::Number(n.clone()),
      InputValue::String(s) => serde_json::Value::String(s.clone()),
    }
  }
}

impl fmt::Display for InputValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      InputValue::Bool(b) => write!(f, "{}", b),
      InputValue::Number(n) => write!(f, "{}", n),
      InputValue::String(s) => f.write_str(s),
    }
  }
}

impl From<&str> for InputValue {
  fn from(value: &str) -> Self {
    InputValue::String(value.to_string())
  }
}

impl From<bool> for InputValue {
  fn from(value: bool) -> Self {
    InputValue::Bool(value)
  }
}

impl From<i64> for InputValue {
  fn from(value: i64) -> Self {
    InputValue::Number(value.into())
  }
}
