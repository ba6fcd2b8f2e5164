use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;
use weft_config::{Format, UnitDef, parse_unit};

use crate::error::RegistryError;
use crate::registry::UnitRegistry;

/// Filesystem-based unit registry.
///
/// Units are plain definition files in a single directory:
/// ```text
/// {root}/
/// ├── docker-build.yaml
/// ├── go-test.yaml
/// └── k8s-deploy.json
/// ```
///
/// The unit name comes from the file's `name` field, not the file name.
/// Files with other extensions are ignored.
pub struct FsUnitRegistry {
  root: PathBuf,
}

impl FsUnitRegistry {
  /// Create a new filesystem registry at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Get the root directory of the registry.
  pub fn root(&self) -> &Path {
    &self.root
  }

  async fn read_unit(path: &Path, format: Format) -> Result<UnitDef, RegistryError> {
    let content = fs::read_to_string(path).await?;
    parse_unit(&content, format).map_err(|source| RegistryError::InvalidUnit {
      path: path.display().to_string(),
      source,
    })
  }

  /// Load every unit file, keyed by unit name.
  async fn load_all(&self) -> Result<BTreeMap<String, (PathBuf, UnitDef)>, RegistryError> {
    let mut units: BTreeMap<String, (PathBuf, UnitDef)> = BTreeMap::new();

    if !self.root.exists() {
      return Ok(units);
    }

    let mut entries = fs::read_dir(&self.root).await?;
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if !path.is_file() {
        continue;
      }
      let Ok(format) = Format::from_path(&path) else {
        continue;
      };

      let unit = Self::read_unit(&path, format).await?;
      debug!(unit = %unit.name, path = %path.display(), "loaded unit");

      if let Some((first, _)) = units.get(&unit.name) {
        return Err(RegistryError::DuplicateUnit {
          name: unit.name.clone(),
          first: first.display().to_string(),
          second: path.display().to_string(),
        });
      }
      units.insert(unit.name.clone(), (path, unit));
    }

    Ok(units)
  }
}

#[async_trait]
impl UnitRegistry for FsUnitRegistry {
  async fn get(&self, name: &str) -> Result<Option<UnitDef>, RegistryError> {
    let mut units = self.load_all().await?;
    Ok(units.remove(name).map(|(_, unit)| unit))
  }

  async fn list(&self) -> Result<Vec<UnitDef>, RegistryError> {
    let units = self.load_all().await?;
    Ok(units.into_values().map(|(_, unit)| unit).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const GO_TEST: &str = r#"
name: go-test
inputs:
  go_version:
    type: string
    default: "1.22"
steps:
  - name: test
    run: go test ./...
"#;

  const NODE_TEST: &str = r#"{
    "name": "nodejs-test",
    "steps": [{ "name": "test", "run": "npm test" }]
  }"#;

  #[tokio::test]
  async fn test_get_and_list() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("go.yaml"), GO_TEST).unwrap();
    std::fs::write(dir.path().join("node.json"), NODE_TEST).unwrap();
    std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

    let registry = FsUnitRegistry::new(dir.path());

    let unit = registry.get("go-test").await.unwrap().unwrap();
    assert_eq!(unit.steps[0].run, "go test ./...");
    assert!(registry.get("missing").await.unwrap().is_none());

    let names: Vec<String> = registry
      .list()
      .await
      .unwrap()
      .into_iter()
      .map(|u| u.name)
      .collect();
    assert_eq!(names, vec!["go-test", "nodejs-test"]);
  }

  #[tokio::test]
  async fn test_duplicate_unit_names() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.yaml"), GO_TEST).unwrap();
    std::fs::write(dir.path().join("b.yml"), GO_TEST).unwrap();

    let registry = FsUnitRegistry::new(dir.path());
    let result = registry.list().await;
    assert!(matches!(result, Err(RegistryError::DuplicateUnit { .. })));
  }

  #[tokio::test]
  async fn test_invalid_unit_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.yaml"), "name: [oops").unwrap();

    let registry = FsUnitRegistry::new(dir.path());
    let result = registry.get("anything").await;
    assert!(matches!(result, Err(RegistryError::InvalidUnit { .. })));
  }

  #[tokio::test]
  async fn test_missing_root_is_empty() {
    let registry = FsUnitRegistry::new("/nonexistent/weft/units");
    assert!(registry.list().await.unwrap().is_empty());
  }
}
