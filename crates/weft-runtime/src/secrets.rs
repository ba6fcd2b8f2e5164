//! Secret values and where they come from.

use std::collections::BTreeMap;
use std::fmt;

/// A secret value. `Debug` never shows the content.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
  pub fn new(value: impl Into<String>) -> Self {
    Self(value.into())
  }

  pub fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for SecretValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("SecretValue(***)")
  }
}

/// Source of orchestrator-level secrets.
pub trait SecretProvider: Send + Sync {
  /// Look up a secret by its orchestrator name.
  fn get(&self, name: &str) -> Option<SecretValue>;
}

/// Reads secrets from `WEFT_SECRET_<NAME>` environment variables.
///
/// The name is upper-cased and any character outside `[A-Z0-9_]` becomes `_`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider;

impl EnvSecretProvider {
  pub fn var_name(name: &str) -> String {
    format!("WEFT_SECRET_{}", env_key(name))
  }
}

impl SecretProvider for EnvSecretProvider {
  fn get(&self, name: &str) -> Option<SecretValue> {
    std::env::var(Self::var_name(name)).ok().map(SecretValue)
  }
}

/// A fixed set of secrets.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
  values: BTreeMap<String, SecretValue>,
}

impl StaticSecrets {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.values.insert(name.into(), SecretValue::new(value));
    self
  }
}

impl SecretProvider for StaticSecrets {
  fn get(&self, name: &str) -> Option<SecretValue> {
    self.values.get(name).cloned()
  }
}

/// Normalize a name for use in an environment variable.
pub(crate) fn env_key(name: &str) -> String {
  name
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() {
        c.to_ascii_uppercase()
      } else {
        '_'
      }
    })
    .collect()
}
