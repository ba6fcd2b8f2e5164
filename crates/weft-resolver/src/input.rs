//! Input rendering and coercion.
//!
//! String inputs are minijinja templates rendered against the node's
//! composition context (`matrix`, and `inputs` for unit-side templates).
//! Undefined variables are errors so that a typo in `{{ matrix.servce }}`
//! is caught while composing rather than producing an empty string.
//!
//! The rendered value is then coerced to the type declared in the contract.

use minijinja::{Environment, UndefinedBehavior, Value};
use weft_config::{InputType, InputValue};

/// Create the template environment used for composition.
pub(crate) fn environment() -> Environment<'static> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  env
}

/// Render a string template against a JSON context.
pub(crate) fn render_str(
  env: &Environment<'_>,
  template: &str,
  context: &serde_json::Value,
) -> Result<String, String> {
  env
    .render_str(template, Value::from_serialize(context))
    .map_err(|e| e.to_string())
}

/// Render an input value. Only strings are templates; other values pass through.
pub fn render_value(value: &InputValue, context: &serde_json::Value) -> Result<InputValue, String> {
  match value {
    InputValue::String(template) => {
      render_str(&environment(), template, context).map(InputValue::String)
    }
    other => Ok(other.clone()),
  }
}

/// Coerce a rendered value to the declared input type.
///
/// Numbers and booleans are accepted for string inputs and stringified;
/// strings are parsed for number and boolean inputs.
pub fn coerce_value(value: &InputValue, input_type: InputType) -> Result<serde_json::Value, String> {
  let mismatch = || format!("expected {}, got '{}'", input_type, value);

  match (input_type, value) {
    (InputType::String, v) => Ok(serde_json::Value::String(v.to_string())),

    (InputType::Number, InputValue::Number(n)) => Ok(serde_json::Value::Number(n.clone())),
    (InputType::Number, InputValue::String(s)) => {
      let s = s.trim();
      if let Ok(i) = s.parse::<i64>() {
        return Ok(serde_json::Value::Number(i.into()));
      }
      s.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .ok_or_else(mismatch)
    }
    (InputType::Number, InputValue::Bool(_)) => Err(mismatch()),

    (InputType::Boolean, InputValue::Bool(b)) => Ok(serde_json::Value::Bool(*b)),
    (InputType::Boolean, InputValue::String(s)) => match s.trim().to_lowercase().as_str() {
      "true" => Ok(serde_json::Value::Bool(true)),
      "false" => Ok(serde_json::Value::Bool(false)),
      _ => Err(mismatch()),
    },
    (InputType::Boolean, InputValue::Number(_)) => Err(mismatch()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_render_matrix_value() {
    let ctx = json!({ "matrix": { "service": "users" } });
    let rendered = render_value(&InputValue::from("services/{{ matrix.service }}"), &ctx).unwrap();
    assert_eq!(rendered, InputValue::from("services/users"));
  }

  #[test]
  fn test_render_undefined_is_error() {
    let ctx = json!({ "matrix": { "service": "users" } });
    assert!(render_value(&InputValue::from("{{ matrix.servce }}"), &ctx).is_err());
  }

  #[test]
  fn test_render_passes_non_strings() {
    let ctx = json!({});
    assert_eq!(
      render_value(&InputValue::from(true), &ctx).unwrap(),
      InputValue::Bool(true)
    );
  }

  #[test]
  fn test_coerce_string() {
    assert_eq!(
      coerce_value(&InputValue::from("x"), InputType::String).unwrap(),
      json!("x")
    );
    assert_eq!(
      coerce_value(&InputValue::from(18), InputType::String).unwrap(),
      json!("18")
    );
  }

  #[test]
  fn test_coerce_number() {
    assert_eq!(
      coerce_value(&InputValue::from("3"), InputType::Number).unwrap(),
      json!(3)
    );
    assert_eq!(
      coerce_value(&InputValue::from("0.5"), InputType::Number).unwrap(),
      json!(0.5)
    );
    assert!(coerce_value(&InputValue::from("three"), InputType::Number).is_err());
    assert!(coerce_value(&InputValue::from(true), InputType::Number).is_err());
  }

  #[test]
  fn test_coerce_boolean() {
    assert_eq!(
      coerce_value(&InputValue::from("TRUE"), InputType::Boolean).unwrap(),
      json!(true)
    );
    assert_eq!(
      coerce_value(&InputValue::from(false), InputType::Boolean).unwrap(),
      json!(false)
    );
    assert!(coerce_value(&InputValue::from("yes"), InputType::Boolean).is_err());
    assert!(coerce_value(&InputValue::from(1), InputType::Boolean).is_err());
  }
}
