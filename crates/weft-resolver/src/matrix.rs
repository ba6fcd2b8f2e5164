//! Matrix expansion.

use std::collections::BTreeMap;

use weft_config::InputValue;

/// Expand matrix axes into their cartesian product.
///
/// Axes are iterated in name order and values in declaration order, so the
/// expansion is deterministic. No matrix yields a single empty combination.
pub fn expand_matrix(
  matrix: Option<&BTreeMap<String, Vec<InputValue>>>,
) -> Vec<BTreeMap<String, serde_json::Value>> {
  let mut combos = vec![BTreeMap::new()];

  let Some(matrix) = matrix else {
    return combos;
  };

  for (axis, values) in matrix {
    let mut next = Vec::with_capacity(combos.len() * values.len());
    for combo in &combos {
      for value in values {
        let mut extended = combo.clone();
        extended.insert(axis.clone(), value.to_json());
        next.push(extended);
      }
    }
    combos = next;
  }

  combos
}

/// Whether two instances agree on every axis they share.
pub fn matrix_agrees(
  a: &BTreeMap<String, serde_json::Value>,
  b: &BTreeMap<String, serde_json::Value>,
) -> bool {
  a.iter()
    .all(|(axis, value)| b.get(axis).is_none_or(|other| other == value))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_no_matrix() {
    let combos = expand_matrix(None);
    assert_eq!(combos.len(), 1);
    assert!(combos[0].is_empty());
  }

  #[test]
  fn test_single_axis() {
    let mut matrix = BTreeMap::new();
    matrix.insert(
      "service".to_string(),
      vec![InputValue::from("users"), InputValue::from("orders")],
    );
    let combos = expand_matrix(Some(&matrix));
    assert_eq!(combos.len(), 2);
    assert_eq!(combos[0]["service"], json!("users"));
    assert_eq!(combos[1]["service"], json!("orders"));
  }

  #[test]
  fn test_cartesian_product() {
    let mut matrix = BTreeMap::new();
    matrix.insert(
      "service".to_string(),
      vec![InputValue::from("users"), InputValue::from("orders")],
    );
    matrix.insert(
      "node".to_string(),
      vec![InputValue::from(18), InputValue::from(20), InputValue::from(22)],
    );
    assert_eq!(expand_matrix(Some(&matrix)).len(), 6);
  }

  #[test]
  fn test_matrix_agrees() {
    let a = BTreeMap::from([("service".to_string(), json!("users"))]);
    let b = BTreeMap::from([
      ("service".to_string(), json!("users")),
      ("node".to_string(), json!(20)),
    ]);
    let c = BTreeMap::from([("service".to_string(), json!("orders"))]);
    let none = BTreeMap::new();

    assert!(matrix_agrees(&a, &b));
    assert!(matrix_agrees(&b, &a));
    assert!(!matrix_agrees(&a, &c));
    assert!(matrix_agrees(&a, &none));
  }
}
