use thiserror::Error;

/// Errors that can occur when working with the unit registry.
#[derive(Debug, Error)]
pub enum RegistryError {
  /// IO error when reading unit files.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// A unit file could not be parsed.
  #[error("invalid unit file {path}: {source}")]
  InvalidUnit {
    path: String,
    #[source]
    source: weft_config::ConfigError,
  },

  /// Two files declare the same unit name.
  #[error("unit '{name}' is defined twice: {first} and {second}")]
  DuplicateUnit {
    name: String,
    first: String,
    second: String,
  },
}
