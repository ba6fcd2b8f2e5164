//! Loading definitions from YAML or JSON.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::orchestrator::OrchestratorDef;
use crate::unit::UnitDef;

/// Errors that can occur while loading definition files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("unsupported file extension: {0}")]
  UnsupportedFormat(String),

  #[error("invalid yaml: {0}")]
  Yaml(#[from] serde_yaml::Error),

  #[error("invalid json: {0}")]
  Json(#[from] serde_json::Error),
}

/// Serialization format of a definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  Yaml,
  Json,
}

impl Format {
  /// Pick the format from a file extension.
  pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
      Some("yaml") | Some("yml") => Ok(Format::Yaml),
      Some("json") => Ok(Format::Json),
      other => Err(ConfigError::UnsupportedFormat(
        other.unwrap_or_default().to_string(),
      )),
    }
  }
}

fn parse<T: DeserializeOwned>(content: &str, format: Format) -> Result<T, ConfigError> {
  match format {
    Format::Yaml => Ok(serde_yaml::from_str(content)?),
    Format::Json => Ok(serde_json::from_str(content)?),
  }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
  let format = Format::from_path(path)?;
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.display().to_string(),
    source,
  })?;
  parse(&content, format)
}

pub fn parse_unit(content: &str, format: Format) -> Result<UnitDef, ConfigError> {
  parse(content, format)
}

pub fn parse_orchestrator(content: &str, format: Format) -> Result<OrchestratorDef, ConfigError> {
  parse(content, format)
}

/// Load a unit definition file.
pub fn load_unit(path: &Path) -> Result<UnitDef, ConfigError> {
  load(path)
}

/// Load an orchestrator definition file.
pub fn load_orchestrator(path: &Path) -> Result<OrchestratorDef, ConfigError> {
  load(path)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{EventKind, InputType, InputValue};

  const UNIT: &str = r#"
name: docker-build
inputs:
  service:
    type: string
    required: true
  push:
    type: boolean
    default: false
secrets: [registry_token]
steps:
  - name: build
    run: docker build -t "$INPUT_SERVICE" .
publish:
  - artifact: "image-{{ inputs.service }}"
    path: image.tar
    always: true
"#;

  const ORCHESTRATOR: &str = r#"
name: ci
on:
  - event: push
    branches: [main, "release/*"]
  - event: pull_request
secrets: [registry_token]
jobs:
  test:
    uses: go-test
    matrix:
      service: [users, orders]
  build:
    uses: docker-build
    needs: [test]
    with:
      service: "{{ matrix.service }}"
    secrets:
      registry_token: registry_token
    matrix:
      service: [users, orders]
"#;

  #[test]
  fn test_parse_unit_yaml() {
    let unit = parse_unit(UNIT, Format::Yaml).unwrap();
    assert_eq!(unit.name, "docker-build");
    assert_eq!(unit.inputs["service"].input_type, InputType::String);
    assert!(unit.inputs["service"].required);
    assert_eq!(unit.inputs["push"].default, Some(InputValue::Bool(false)));
    assert!(unit.secrets.contains("registry_token"));
    assert_eq!(unit.steps.len(), 1);
    assert!(unit.publish[0].always);
    assert_eq!(unit.publish[0].retention_days, None);
  }

  #[test]
  fn test_parse_orchestrator_yaml() {
    let def = parse_orchestrator(ORCHESTRATOR, Format::Yaml).unwrap();
    assert_eq!(def.name, "ci");
    assert_eq!(def.triggers.len(), 2);
    assert_eq!(def.triggers[0].event, EventKind::Push);
    assert!(def.triggers[1].branches.is_empty());

    let build = &def.jobs["build"];
    assert_eq!(build.needs, vec!["test".to_string()]);
    assert_eq!(build.matrix.as_ref().unwrap()["service"].len(), 2);
    assert!(!build.always);
    assert!(!build.optional);
  }

  #[test]
  fn test_parse_orchestrator_json() {
    let json = r#"{
      "name": "cd",
      "on": [{ "event": "manual" }],
      "jobs": { "deploy": { "uses": "k8s-deploy", "with": { "replicas": 3 } } }
    }"#;
    let def = parse_orchestrator(json, Format::Json).unwrap();
    assert_eq!(def.triggers[0].event, EventKind::Manual);
    assert_eq!(def.jobs["deploy"].with["replicas"], InputValue::from(3));
  }

  #[test]
  fn test_format_from_path() {
    assert_eq!(Format::from_path(Path::new("ci.yml")).unwrap(), Format::Yaml);
    assert_eq!(Format::from_path(Path::new("ci.json")).unwrap(), Format::Json);
    assert!(matches!(
      Format::from_path(Path::new("ci.toml")),
      Err(ConfigError::UnsupportedFormat(_))
    ));
  }

  #[test]
  fn test_load_missing_file() {
    let result = load_unit(Path::new("/nonexistent/unit.yaml"));
    assert!(matches!(result, Err(ConfigError::Read { .. })));
  }
}
