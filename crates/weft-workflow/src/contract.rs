use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use weft_config::{InputSpec, PublishDef, StepDef, UnitDef};

/// The validated contract of a reusable unit.
///
/// `artifacts` holds the (templated) names the unit may publish; concrete
/// names are rendered per job node during composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitContract {
  pub name: String,
  pub inputs: BTreeMap<String, InputSpec>,
  pub secrets: BTreeSet<String>,
  pub artifacts: BTreeSet<String>,
  pub steps: Vec<StepDef>,
  pub publish: Vec<PublishDef>,
}

impl UnitContract {
  pub fn declares_input(&self, name: &str) -> bool {
    self.inputs.contains_key(name)
  }

  pub fn declares_secret(&self, name: &str) -> bool {
    self.secrets.contains(name)
  }

  /// An artifact the unit lists in more than one publish entry.
  pub fn repeated_artifact(&self) -> Option<&str> {
    if self.artifacts.len() == self.publish.len() {
      return None;
    }
    let mut seen = BTreeSet::new();
    self
      .publish
      .iter()
      .map(|p| p.artifact.as_str())
      .find(|artifact| !seen.insert(*artifact))
  }
}

impl From<UnitDef> for UnitContract {
  fn from(def: UnitDef) -> Self {
    let artifacts = def.publish.iter().map(|p| p.artifact.clone()).collect();
    Self {
      name: def.name,
      inputs: def.inputs,
      secrets: def.secrets,
      artifacts,
      steps: def.steps,
      publish: def.publish,
    }
  }
}
