use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A validated artifact name.
///
/// Names are `/`-separated segments of `[A-Za-z0-9._-]`. Segments may not
/// be empty, `.`/`..`, or start with a dot; the stores keep their own
/// bookkeeping files under dot-prefixed names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactName(String);

impl ArtifactName {
  pub fn parse(name: impl Into<String>) -> Result<Self, Error> {
    let name = name.into();
    let invalid = |reason: &str| Error::InvalidName {
      name: name.clone(),
      reason: reason.to_string(),
    };

    if name.is_empty() {
      return Err(invalid("name is empty"));
    }
    for segment in name.split('/') {
      if segment.is_empty() {
        return Err(invalid("empty path segment"));
      }
      if segment.starts_with('.') {
        return Err(invalid("segments may not start with '.'"));
      }
      if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
      {
        return Err(invalid(&format!("unexpected character '{}'", c)));
      }
    }

    Ok(Self(name))
  }

  /// Nest `child` under this name, e.g. an execution id scope.
  pub fn join(&self, child: &ArtifactName) -> ArtifactName {
    ArtifactName(format!("{}/{}", self.0, child.0))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ArtifactName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl TryFrom<String> for ArtifactName {
  type Error = Error;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(value)
  }
}

impl From<ArtifactName> for String {
  fn from(value: ArtifactName) -> Self {
    value.0
  }
}
